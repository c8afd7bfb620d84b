//! Per-query pipeline: validating, syncing, retrieving, extracting, resolving.
//!
//! Stages run strictly in order. Syncing and retrieving share one critical section so a
//! search never observes an index that is partway through a sync. An optional deadline bounds
//! the whole query; when it fires during a sync, whatever the sync already applied is still
//! persisted.

use std::{future::Future, time::Duration};

use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::Instrument;
use uuid::Uuid;

use tether_domain::GroundedResult;

use crate::{
	Error, QueryError, Result, Stage, SyncReport, TetherService, extract, resolve, retrieve, sync,
};

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
	pub query_id: Uuid,
	pub sync: SyncReport,
	/// Candidates that cleared the retrieval threshold.
	pub candidates: usize,
	pub grounded: GroundedResult,
}

/// What [`TetherService::warm_up`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
	Loaded { entries: usize },
	ColdStart(SyncReport),
}

impl TetherService {
	/// Loads an existing index as-is, or builds one from a full source listing when the index
	/// is empty. A source outage during a cold start is an error; there is nothing to fall
	/// back to.
	pub async fn warm_up(&self) -> Result<Startup> {
		let _guard = self.lock.lock().await;
		let ids = self.index.current_ids().await?;

		if !ids.is_empty() {
			tracing::info!(entries = ids.len(), "Loaded existing index.");

			return Ok(Startup::Loaded { entries: ids.len() });
		}

		tracing::info!("Index is empty; building from source.");

		let records = self
			.providers
			.source
			.fetch_all(&self.cfg.source)
			.await
			.map_err(|err| Error::SourceUnavailable { message: err.to_string() })?;
		let report = sync::apply(self.index.as_ref(), records, &self.cfg).await?;

		Ok(Startup::ColdStart(report))
	}

	/// Runs one synchronization outside of any query.
	pub async fn sync_now(&self) -> Result<SyncReport> {
		let _guard = self.lock.lock().await;

		sync::synchronize(self.index.as_ref(), self.providers.source.as_ref(), &self.cfg).await
	}

	pub async fn query(&self, text: &str) -> Result<QueryResponse, QueryError> {
		let query_id = Uuid::new_v4();
		let span = tracing::info_span!("query", query_id = %query_id);

		self.run_query(query_id, text).instrument(span).await
	}

	/// Like [`Self::query`], but re-runs the whole query when the model's output fails schema
	/// validation, up to `pipeline.schema_retries` extra times. Other failures are returned
	/// immediately.
	pub async fn query_with_retry(&self, text: &str) -> Result<QueryResponse, QueryError> {
		let mut retries = 0;

		loop {
			match self.query(text).await {
				Err(err)
					if err.is_schema_violation() && retries < self.cfg.pipeline.schema_retries =>
				{
					retries += 1;

					tracing::warn!(
						retries,
						error = %err,
						"Extraction output rejected; retrying query."
					);
				},
				outcome => return outcome,
			}
		}
	}

	async fn run_query(&self, query_id: Uuid, text: &str) -> Result<QueryResponse, QueryError> {
		let query = text.trim();

		if query.is_empty() {
			return Err(QueryError::new(
				Stage::Validating,
				Error::InvalidRequest { message: "Query text must be non-empty.".to_string() },
			));
		}

		let deadline =
			self.cfg.pipeline.deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

		enter(Stage::Syncing);

		let guard =
			within(deadline, Stage::Syncing, async { Ok::<_, Error>(self.lock.lock().await) })
				.await?;
		let sync_report = match within(
			deadline,
			Stage::Syncing,
			sync::synchronize(self.index.as_ref(), self.providers.source.as_ref(), &self.cfg),
		)
		.await
		{
			Ok(report) => report,
			Err(err) => {
				if err.is_timeout() {
					self.persist_after_timeout().await;
				}

				return Err(err);
			},
		};

		enter(Stage::Retrieving);

		let candidates = within(
			deadline,
			Stage::Retrieving,
			retrieve::retrieve(
				self.index.as_ref(),
				query,
				self.cfg.retrieval.top_k as usize,
				self.cfg.retrieval.score_threshold,
			),
		)
		.await?;

		drop(guard);

		enter(Stage::Extracting);

		let extraction = within(
			deadline,
			Stage::Extracting,
			extract::extract(
				self.providers.extractor.as_ref(),
				&self.cfg.providers.llm_extractor,
				query,
				&candidates,
			),
		)
		.await?;

		enter(Stage::Resolving);

		let grounded = within(
			deadline,
			Stage::Resolving,
			async {
				Ok::<_, Error>(resolve::resolve(
					self.providers.source.as_ref(),
					&self.cfg.source,
					&extraction,
					self.cfg.resolve.max_concurrency,
				)
				.await)
			},
		)
		.await?;

		tracing::info!(
			candidates = candidates.len(),
			categories = grounded.len(),
			records = grounded.record_ids().len(),
			degraded = sync_report.degraded,
			"Query completed."
		);

		Ok(QueryResponse { query_id, sync: sync_report, candidates: candidates.len(), grounded })
	}

	async fn persist_after_timeout(&self) {
		match self.index.persist().await {
			Ok(()) => tracing::info!("Persisted partial sync after deadline."),
			Err(err) => tracing::error!(error = %err, "Failed to persist partial sync."),
		}
	}
}

fn enter(stage: Stage) {
	tracing::debug!(stage = %stage, "Entering stage.");
}

async fn within<T, F>(deadline: Option<Instant>, stage: Stage, fut: F) -> Result<T, QueryError>
where
	F: Future<Output = Result<T>>,
{
	let outcome = match deadline {
		Some(deadline) => time::timeout_at(deadline, fut)
			.await
			.unwrap_or_else(|_| Err(Error::Timeout { stage })),
		None => fut.await,
	};

	outcome.map_err(|error| {
		tracing::debug!(stage = %stage, error = %error, "Stage failed.");

		QueryError::new(stage, error)
	})
}
