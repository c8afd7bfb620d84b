//! Reconciles the index id set with the source id set.
//!
//! Only ids that appeared or disappeared are touched. Content edits behind an unchanged id are
//! not detected.

use std::collections::{BTreeMap, BTreeSet};

use futures::{StreamExt, stream};
use serde::Serialize;

use tether_config::Config;
use tether_domain::{Record, RecordId};

use crate::{Error, RecordSource, Result, SemanticIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
	pub added: usize,
	pub deleted: usize,
	/// Ids whose add or delete failed. They are retried by the next sync.
	pub failed: usize,
	/// The source could not be listed, so the index was left as it was.
	pub degraded: bool,
}
impl SyncReport {
	pub fn degraded() -> Self {
		Self { degraded: true, ..Self::default() }
	}

	pub fn is_noop(&self) -> bool {
		self.added == 0 && self.deleted == 0 && self.failed == 0
	}
}

/// The id-level difference between source and index. The two sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
	pub to_add: BTreeSet<RecordId>,
	pub to_delete: BTreeSet<RecordId>,
}
impl SyncPlan {
	pub fn new(source_ids: &BTreeSet<RecordId>, index_ids: &BTreeSet<RecordId>) -> Self {
		Self {
			to_add: source_ids.difference(index_ids).copied().collect(),
			to_delete: index_ids.difference(source_ids).copied().collect(),
		}
	}
}

/// Lists the source and applies the difference. A source that cannot be listed degrades the
/// sync instead of failing it.
pub async fn synchronize(
	index: &dyn SemanticIndex,
	source: &dyn RecordSource,
	cfg: &Config,
) -> Result<SyncReport> {
	let records = match source.fetch_all(&cfg.source).await {
		Ok(records) => records,
		Err(err) => {
			tracing::warn!(error = %err, "Source fetch failed; serving stale index.");

			return Ok(SyncReport::degraded());
		},
	};

	apply(index, records, cfg).await
}

/// Brings the index in line with `records`, which must be a full listing of the source.
///
/// Per-id add failures are counted and skipped. Only a failed `persist` is fatal.
pub async fn apply(
	index: &dyn SemanticIndex,
	records: Vec<Record>,
	cfg: &Config,
) -> Result<SyncReport> {
	let mut by_id = BTreeMap::new();

	for record in records {
		if let Some(previous) = by_id.insert(record.id, record) {
			tracing::warn!(record_id = previous.id, "Source listed a record id twice.");
		}
	}

	let source_ids: BTreeSet<RecordId> = by_id.keys().copied().collect();
	let index_ids = index.current_ids().await?;
	let plan = SyncPlan::new(&source_ids, &index_ids);
	let mut report = SyncReport::default();
	let text_fields = cfg.projection.text_fields.as_slice();
	let additions: Vec<Record> =
		plan.to_add.iter().filter_map(|id| by_id.remove(id)).collect();
	let outcomes: Vec<(RecordId, Result<()>)> = stream::iter(additions)
		.map(move |record| async move {
			let text = tether_domain::project(&record, text_fields);

			(record.id, index.upsert(record.id, &text).await)
		})
		.buffer_unordered(cfg.sync.max_concurrency.max(1))
		.collect()
		.await;

	for (id, outcome) in outcomes {
		match outcome {
			Ok(()) => report.added += 1,
			Err(err) => {
				tracing::warn!(record_id = id, error = %err, "Index add failed; skipping record.");

				report.failed += 1;
			},
		}
	}

	if !plan.to_delete.is_empty() {
		match index.delete(&plan.to_delete).await {
			Ok(()) => report.deleted = plan.to_delete.len(),
			Err(err) => {
				tracing::warn!(
					count = plan.to_delete.len(),
					error = %err,
					"Index delete failed; keeping stale entries."
				);

				report.failed += plan.to_delete.len();
			},
		}
	}

	index.persist().await.map_err(into_persistence)?;

	tracing::info!(
		added = report.added,
		deleted = report.deleted,
		failed = report.failed,
		degraded = report.degraded,
		"Index synchronized."
	);

	Ok(report)
}

fn into_persistence(err: Error) -> Error {
	match err {
		Error::IndexPersistence { .. } => err,
		other => Error::IndexPersistence { message: other.to_string() },
	}
}
