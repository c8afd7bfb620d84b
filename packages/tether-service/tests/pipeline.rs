use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde_json::json;
use tempfile::TempDir;

use tether_config::Config;
use tether_domain::{Record, RecordId};
use tether_service::{Error, LocalIndex, SemanticIndex, Stage, Startup, SyncReport, TetherService};
use tether_testkit::{HashEmbedding, InMemorySource, ScriptedExtractor, user};

struct Harness {
	dir: TempDir,
	service: TetherService,
	source: Arc<InMemorySource>,
	embedding: Arc<HashEmbedding>,
	extractor: Arc<ScriptedExtractor>,
}

fn build(
	cfg: Config,
	source: Arc<InMemorySource>,
	embedding: Arc<HashEmbedding>,
	extractor: Arc<ScriptedExtractor>,
) -> TetherService {
	let index = LocalIndex::open(&cfg, embedding.clone()).expect("Failed to open local index.");
	let providers = tether_testkit::providers(embedding, extractor, source);

	TetherService::with_providers(cfg, Arc::new(index), providers)
}

fn harness_with(
	records: Vec<Record>,
	extractor: ScriptedExtractor,
	configure: impl FnOnce(&mut Config),
) -> Harness {
	let dir = TempDir::new().expect("Failed to create temp dir.");
	let mut cfg = tether_testkit::test_config(dir.path());

	configure(&mut cfg);

	let source = Arc::new(InMemorySource::new(records));
	let embedding = Arc::new(HashEmbedding::new());
	let extractor = Arc::new(extractor);
	let service = build(cfg, source.clone(), embedding.clone(), extractor.clone());

	Harness { dir, service, source, embedding, extractor }
}

fn harness(records: Vec<Record>, extractor: ScriptedExtractor) -> Harness {
	harness_with(records, extractor, |_| {})
}

fn hikers() -> Vec<Record> {
	vec![
		user(1, "Loves hiking in the mountains."),
		user(2, "Collects stamps and plays chess."),
		user(3, "Weekend hiking and camping."),
	]
}

fn ids(values: &[RecordId]) -> BTreeSet<RecordId> {
	values.iter().copied().collect()
}

fn grounded_ids(records: Option<&[Record]>) -> Option<Vec<RecordId>> {
	records.map(|records| records.iter().map(|record| record.id).collect())
}

async fn index_ids(service: &TetherService) -> BTreeSet<RecordId> {
	service.index.current_ids().await.expect("current_ids failed")
}

#[tokio::test]
async fn cold_start_builds_from_full_listing() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));
	let startup = h.service.warm_up().await.expect("warm_up failed");

	assert_eq!(
		startup,
		Startup::ColdStart(SyncReport { added: 3, deleted: 0, failed: 0, degraded: false })
	);
	assert_eq!(index_ids(&h.service).await, ids(&[1, 2, 3]));
	assert!(h.dir.path().join("hobbies").join("index.json").exists());
}

#[tokio::test]
async fn cold_start_fails_when_source_is_down() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));

	h.source.set_down(true);

	let err = h.service.warm_up().await.expect_err("Expected cold start failure.");

	assert!(matches!(err, Error::SourceUnavailable { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn sync_applies_id_difference() {
	let h = harness(
		vec![user(2, "Sails."), user(3, "Paints."), user(4, "Runs.")],
		ScriptedExtractor::matching(json!({})),
	);

	h.service.warm_up().await.expect("warm_up failed");
	h.source.remove(4);
	h.source.insert(user(1, "Hikes."));

	let report = h.service.sync_now().await.expect("sync failed");

	assert_eq!(report, SyncReport { added: 1, deleted: 1, failed: 0, degraded: false });
	assert_eq!(index_ids(&h.service).await, ids(&[1, 2, 3]));
}

#[tokio::test]
async fn sync_converges_from_any_index_state() {
	let cases: [(&[RecordId], &[RecordId]); 4] = [
		(&[1, 2, 3], &[]),
		(&[], &[1, 2, 3]),
		(&[5, 6], &[1, 2]),
		(&[1, 2, 3, 4], &[2, 4, 6, 8]),
	];

	for (source_ids, index_state) in cases {
		let h = harness(
			index_state.iter().map(|id| user(*id, "Reads.")).collect(),
			ScriptedExtractor::matching(json!({})),
		);

		h.service.warm_up().await.expect("warm_up failed");

		for id in index_state {
			h.source.remove(*id);
		}
		for id in source_ids {
			h.source.insert(user(*id, "Writes."));
		}

		h.service.sync_now().await.expect("sync failed");

		assert_eq!(index_ids(&h.service).await, ids(source_ids));
	}
}

#[tokio::test]
async fn second_sync_against_unchanged_source_is_a_noop() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));

	h.service.warm_up().await.expect("warm_up failed");
	h.source.insert(user(9, "Knits."));

	let first = h.service.sync_now().await.expect("sync failed");
	let embedded = h.embedding.texts_embedded();
	let second = h.service.sync_now().await.expect("sync failed");

	assert_eq!(first.added, 1);
	assert!(second.is_noop(), "Unexpected report: {second:?}");
	assert_eq!(h.embedding.texts_embedded(), embedded);
}

#[tokio::test]
async fn content_edit_behind_same_id_is_not_reembedded() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));

	h.service.warm_up().await.expect("warm_up failed");

	let embedded = h.embedding.texts_embedded();

	h.source.insert(user(2, "Gave up chess for rock climbing."));

	let report = h.service.sync_now().await.expect("sync failed");

	assert!(report.is_noop(), "Unexpected report: {report:?}");
	assert_eq!(h.embedding.texts_embedded(), embedded);
}

#[tokio::test]
async fn failed_adds_are_isolated_and_retried() {
	let h = harness(
		vec![user(1, "Hikes."), user(2, "Handles poison ivy."), user(3, "Swims.")],
		ScriptedExtractor::matching(json!({})),
	);

	h.embedding.fail_on("poison");

	let Startup::ColdStart(report) = h.service.warm_up().await.expect("warm_up failed") else {
		panic!("Expected a cold start.");
	};

	assert_eq!(report, SyncReport { added: 2, deleted: 0, failed: 1, degraded: false });
	assert_eq!(index_ids(&h.service).await, ids(&[1, 3]));

	let retry = h.service.sync_now().await.expect("sync failed");

	assert_eq!(retry.failed, 1, "The failed id is attempted again on the next sync.");
	assert_eq!(retry.added, 0);
}

#[tokio::test]
async fn existing_index_is_loaded_without_rebuild() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));

	h.service.warm_up().await.expect("warm_up failed");

	let cfg = tether_testkit::test_config(h.dir.path());
	let source = Arc::new(InMemorySource::new(hikers()));
	let embedding = Arc::new(HashEmbedding::new());
	let restarted = build(
		cfg,
		source.clone(),
		embedding.clone(),
		Arc::new(ScriptedExtractor::matching(json!({}))),
	);

	assert_eq!(restarted.warm_up().await.expect("warm_up failed"), Startup::Loaded { entries: 3 });
	assert_eq!(source.list_calls(), 0);
	assert_eq!(embedding.texts_embedded(), 0);
}

#[tokio::test]
async fn unknown_ids_are_dropped_from_results() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1, 99] })));
	let response = h.service.query("Who likes hiking?").await.expect("query failed");

	assert_eq!(response.grounded.labels().collect::<Vec<_>>(), vec!["hiking"]);
	assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![1]));
	assert_eq!(response.grounded.get("hiking").map(|r| r[0].clone()), Some(hikers()[0].clone()));
}

#[tokio::test]
async fn every_grounded_record_exists_in_source() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "outdoors": [1, 3, 2] })));

	h.service.warm_up().await.expect("warm_up failed");
	h.source.remove(3);

	let response = h.service.query("hiking").await.expect("query failed");
	let live = h.source.ids();

	assert!(response.grounded.record_ids().iter().all(|id| live.contains(id)));
	assert_eq!(grounded_ids(response.grounded.get("outdoors")), Some(vec![1, 2]));
	assert_eq!(response.sync.deleted, 1);
}

#[tokio::test]
async fn listing_outage_serves_stale_index() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1, 3] })));

	h.service.warm_up().await.expect("warm_up failed");
	h.source.set_listing_down(true);
	h.source.insert(user(4, "New hiking fan."));

	let response = h.service.query("hiking").await.expect("Degraded query must still succeed.");

	assert!(response.sync.degraded);
	assert!(response.sync.is_noop());
	assert!(response.candidates > 0);
	assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![1, 3]));
	assert!(!index_ids(&h.service).await.contains(&4));
}

#[tokio::test]
async fn full_outage_completes_with_nothing_grounded() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1] })));

	h.service.warm_up().await.expect("warm_up failed");
	h.source.set_down(true);

	let response = h.service.query("hiking").await.expect("query failed");

	assert!(response.sync.degraded);
	assert!(response.candidates > 0, "Search runs against the stale index.");
	assert!(response.grounded.is_empty());
	assert_eq!(h.extractor.calls(), 1);
}

#[tokio::test]
async fn sole_failing_fetch_leaves_query_completed() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1] })));

	h.source.fail_id(1);

	let response = h.service.query("hiking").await.expect("query failed");

	assert!(response.grounded.is_empty());
	assert_eq!(h.source.item_calls(), 1);
}

#[tokio::test]
async fn non_list_ids_fail_before_resolution() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": "not-a-list" })));
	let err = h.service.query("hiking").await.expect_err("Expected schema failure.");

	assert_eq!(err.stage, Stage::Extracting);
	assert!(err.is_schema_violation(), "Unexpected error: {err}");
	assert_eq!(h.source.item_calls(), 0, "The resolver must not run.");
}

#[tokio::test]
async fn categories_without_survivors_are_omitted() {
	let h = harness(
		hikers(),
		ScriptedExtractor::matching(json!({ "hiking": [1], "chess": [98, 99], "empty": [] })),
	);
	let response = h.service.query("hiking").await.expect("query failed");

	assert_eq!(response.grounded.labels().collect::<Vec<_>>(), vec!["hiking"]);
	assert_eq!(response.grounded.get("chess"), None);
}

#[tokio::test]
async fn duplicates_collapse_within_but_not_across_categories() {
	let h = harness(
		hikers(),
		ScriptedExtractor::matching(json!({ "hiking": [3, 1, 3, 1], "camping": [3] })),
	);
	let response = h.service.query("hiking").await.expect("query failed");

	assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![3, 1]));
	assert_eq!(grounded_ids(response.grounded.get("camping")), Some(vec![3]));
	assert_eq!(h.source.item_calls(), 2, "Each distinct id is fetched once.");
}

#[tokio::test]
async fn failing_fetch_drops_only_that_id() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1, 3] })));

	h.source.fail_id(3);

	let response = h.service.query("hiking").await.expect("query failed");

	assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![1]));
}

#[tokio::test]
async fn prompt_carries_projection_text_only() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));

	h.service.query("hiking").await.expect("query failed");

	let messages = h.extractor.last_messages();
	let user_prompt = messages[1]["content"].as_str().expect("User prompt must be text.");

	assert!(user_prompt.contains("Loves hiking in the mountains."));
	assert!(!user_prompt.contains("User 1"), "Non-searchable attributes must not leak.");
}

#[tokio::test]
async fn nothing_above_threshold_skips_extraction() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1] })));
	let response = h.service.query("???").await.expect("query failed");

	assert_eq!(response.candidates, 0);
	assert!(response.grounded.is_empty());
	assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn blank_query_is_rejected_up_front() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({})));
	let err = h.service.query("   ").await.expect_err("Expected invalid request.");

	assert_eq!(err.stage, Stage::Validating);
	assert!(matches!(err.error, Error::InvalidRequest { .. }));
	assert_eq!(h.source.list_calls(), 0);
}

#[tokio::test]
async fn schema_failures_are_retried_by_policy() {
	let h = harness(
		hikers(),
		ScriptedExtractor::new(["not json", "{\"matches\": {\"hiking\": [1]}}"]),
	);
	let response = h.service.query_with_retry("hiking").await.expect("Retry must succeed.");

	assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![1]));
	assert_eq!(h.extractor.calls(), 2);
}

#[tokio::test]
async fn retry_budget_is_respected() {
	let h = harness_with(hikers(), ScriptedExtractor::new(["not json"]), |cfg| {
		cfg.pipeline.schema_retries = 2;
	});
	let err = h.service.query_with_retry("hiking").await.expect_err("Expected schema failure.");

	assert!(err.is_schema_violation());
	assert_eq!(h.extractor.calls(), 3);
}

#[tokio::test]
async fn plain_query_does_not_retry() {
	let h = harness(hikers(), ScriptedExtractor::new(["not json", "{\"matches\": {}}"]));
	let err = h.service.query("hiking").await.expect_err("Expected schema failure.");

	assert!(err.is_schema_violation());
	assert_eq!(h.extractor.calls(), 1);
}

#[tokio::test]
async fn slow_extraction_times_out() {
	let h = harness_with(
		hikers(),
		ScriptedExtractor::matching(json!({ "hiking": [1] })).with_delay(Duration::from_secs(30)),
		|cfg| cfg.pipeline.deadline_ms = Some(1_000),
	);
	let err = h.service.query("hiking").await.expect_err("Expected timeout.");

	assert_eq!(err.stage, Stage::Extracting);
	assert!(matches!(err.error, Error::Timeout { stage: Stage::Extracting }));
	assert_eq!(h.source.item_calls(), 0);
}

#[tokio::test]
async fn sync_timeout_persists_adds_that_finished() {
	let h = harness_with(
		vec![user(1, "Hikes."), user(2, "Crosses glaciers slowly."), user(3, "Swims.")],
		ScriptedExtractor::matching(json!({})),
		|cfg| cfg.pipeline.deadline_ms = Some(300),
	);

	h.embedding.delay_on("glaciers", Duration::from_secs(30));

	let err = h.service.query("hiking").await.expect_err("Expected timeout.");

	assert_eq!(err.stage, Stage::Syncing);
	assert!(err.is_timeout());

	let cfg = tether_testkit::test_config(h.dir.path());
	let reopened = LocalIndex::open(&cfg, Arc::new(HashEmbedding::new()))
		.expect("Failed to reopen local index.");

	assert_eq!(reopened.current_ids().await.expect("current_ids failed"), ids(&[1, 3]));
}

#[tokio::test]
async fn persist_failure_fails_the_query_while_syncing() {
	let dir = TempDir::new().expect("Failed to create temp dir.");
	let blocker = dir.path().join("blocker");

	std::fs::write(&blocker, b"not a directory").expect("Failed to write blocker file.");

	let cfg = tether_testkit::test_config(&blocker);
	let source = Arc::new(InMemorySource::new(hikers()));
	let service = build(
		cfg,
		source,
		Arc::new(HashEmbedding::new()),
		Arc::new(ScriptedExtractor::matching(json!({ "hiking": [1] }))),
	);
	let err = service.query("hiking").await.expect_err("Expected a persistence failure.");

	assert_eq!(err.stage, Stage::Syncing);
	assert!(matches!(err.error, Error::IndexPersistence { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn concurrent_queries_sync_one_at_a_time() {
	let h = harness(hikers(), ScriptedExtractor::matching(json!({ "hiking": [1] })));

	h.source.set_list_delay(Duration::from_millis(20));

	let service = Arc::new(h.service);
	let handles: Vec<_> = (0..4)
		.map(|_| {
			let service = service.clone();

			tokio::spawn(async move { service.query("hiking").await })
		})
		.collect();

	for handle in handles {
		let response = handle.await.expect("Query task panicked.").expect("query failed");

		assert_eq!(grounded_ids(response.grounded.get("hiking")), Some(vec![1]));
	}

	assert_eq!(h.source.list_calls(), 4);
	assert_eq!(h.source.max_concurrent_lists(), 1);
}
