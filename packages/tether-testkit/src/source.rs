use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use tokio::time;

use tether_config::Source;
use tether_domain::{Record, RecordId};
use tether_service::{BoxFuture, RecordSource};

/// A mutable record store with an outage switch and call counters.
#[derive(Default)]
pub struct InMemorySource {
	records: Mutex<BTreeMap<RecordId, Record>>,
	down: AtomicBool,
	listing_down: AtomicBool,
	failing_ids: Mutex<BTreeSet<RecordId>>,
	list_delay: Mutex<Option<Duration>>,
	list_calls: AtomicUsize,
	item_calls: AtomicUsize,
	lists_in_flight: AtomicUsize,
	max_lists_in_flight: AtomicUsize,
}
impl InMemorySource {
	pub fn new<I>(records: I) -> Self
	where
		I: IntoIterator<Item = Record>,
	{
		let source = Self::default();

		source.records().extend(records.into_iter().map(|record| (record.id, record)));

		source
	}

	pub fn insert(&self, record: Record) {
		self.records().insert(record.id, record);
	}

	pub fn remove(&self, id: RecordId) -> Option<Record> {
		self.records().remove(&id)
	}

	pub fn ids(&self) -> BTreeSet<RecordId> {
		self.records().keys().copied().collect()
	}

	/// While down, every call fails as if the service were unreachable.
	pub fn set_down(&self, down: bool) {
		self.down.store(down, Ordering::SeqCst);
	}

	/// Fails only `fetch_all`; per-id fetches keep working.
	pub fn set_listing_down(&self, down: bool) {
		self.listing_down.store(down, Ordering::SeqCst);
	}

	/// Makes `fetch_by_id(id)` fail with a transport-style error.
	pub fn fail_id(&self, id: RecordId) {
		self.failing_ids.lock().unwrap_or_else(|err| err.into_inner()).insert(id);
	}

	pub fn set_list_delay(&self, delay: Duration) {
		*self.list_delay.lock().unwrap_or_else(|err| err.into_inner()) = Some(delay);
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}

	pub fn item_calls(&self) -> usize {
		self.item_calls.load(Ordering::SeqCst)
	}

	/// Highest number of `fetch_all` calls observed running at once.
	pub fn max_concurrent_lists(&self) -> usize {
		self.max_lists_in_flight.load(Ordering::SeqCst)
	}

	fn records(&self) -> MutexGuard<'_, BTreeMap<RecordId, Record>> {
		self.records.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn check_up(&self) -> color_eyre::Result<()> {
		if self.down.load(Ordering::SeqCst) {
			return Err(eyre::eyre!("Connection refused."));
		}

		Ok(())
	}
}
impl RecordSource for InMemorySource {
	fn fetch_all<'a>(&'a self, _cfg: &'a Source) -> BoxFuture<'a, color_eyre::Result<Vec<Record>>> {
		Box::pin(async move {
			self.list_calls.fetch_add(1, Ordering::SeqCst);
			self.check_up()?;

			if self.listing_down.load(Ordering::SeqCst) {
				return Err(eyre::eyre!("Listing endpoint unavailable."));
			}

			let in_flight = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_lists_in_flight.fetch_max(in_flight, Ordering::SeqCst);

			let delay = *self.list_delay.lock().unwrap_or_else(|err| err.into_inner());

			if let Some(delay) = delay {
				time::sleep(delay).await;
			}

			let records: Vec<Record> = self.records().values().cloned().collect();

			self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);

			Ok(records)
		})
	}

	fn fetch_by_id<'a>(
		&'a self,
		_cfg: &'a Source,
		id: RecordId,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move {
			self.item_calls.fetch_add(1, Ordering::SeqCst);
			self.check_up()?;

			if self.failing_ids.lock().unwrap_or_else(|err| err.into_inner()).contains(&id) {
				return Err(eyre::eyre!("Fetching record {id} timed out."));
			}

			Ok(self.records().get(&id).cloned())
		})
	}
}
