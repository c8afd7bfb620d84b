use std::sync::Arc;

use serde_json::json;

use tether_service::{QdrantIndex, SemanticIndex, Startup, TetherService};
use tether_testkit::{HashEmbedding, InMemorySource, ScriptedExtractor, user};

#[tokio::test]
#[ignore = "Requires external Qdrant. Set TETHER_QDRANT_URL to run."]
async fn qdrant_index_syncs_and_grounds() {
	let Some(url) = tether_testkit::env_qdrant_url() else {
		eprintln!("Skipping qdrant_index_syncs_and_grounds; set TETHER_QDRANT_URL to run.");

		return;
	};
	let namespace = format!("pipeline_{}", std::process::id());
	let cfg = tether_testkit::qdrant_test_config(&url, &namespace);
	let embedding = Arc::new(HashEmbedding::new());
	let index = QdrantIndex::connect(&cfg, embedding.clone()).await.expect("Failed to connect.");
	let stale = index.current_ids().await.expect("current_ids failed");

	index.delete(&stale).await.expect("Failed to clear collection.");

	let source = Arc::new(InMemorySource::new([
		user(1, "Loves hiking in the mountains."),
		user(2, "Collects stamps."),
	]));
	let extractor = Arc::new(ScriptedExtractor::matching(json!({ "hiking": [1, 2, 99] })));
	let providers = tether_testkit::providers(embedding, extractor, source.clone());
	let service = TetherService::with_providers(cfg, Arc::new(index), providers);

	assert!(matches!(service.warm_up().await.expect("warm_up failed"), Startup::ColdStart(_)));

	source.remove(2);

	let response = service.query("hiking").await.expect("query failed");

	assert_eq!(response.sync.deleted, 1);
	assert_eq!(response.grounded.record_ids(), vec![1]);
}
