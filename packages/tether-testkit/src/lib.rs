//! In-process fakes for exercising the pipeline without network services.

pub mod embedding;
pub mod extractor;
pub mod source;

pub use embedding::HashEmbedding;
pub use extractor::ScriptedExtractor;
pub use source::InMemorySource;

use std::{env, path::Path, sync::Arc};

use serde_json::{Map, Value};

use tether_config::{
	Config, EmbeddingProviderConfig, IndexBackend, IndexSync, LlmProviderConfig, LocalStorage,
	Pipeline, Projection, Providers, Qdrant, Resolution, Retrieval, Service, Source, Storage,
};
use tether_domain::{Record, RecordId};

pub const TEST_VECTOR_DIM: u32 = 64;

pub fn env_qdrant_url() -> Option<String> {
	env::var("TETHER_QDRANT_URL").ok().filter(|url| !url.trim().is_empty())
}

/// A local-backend config rooted at `data_dir`, with no deadline and a permissive threshold.
pub fn test_config(data_dir: &Path) -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		source: Source {
			api_base: "http://127.0.0.1:1".to_string(),
			list_path: "/v1/users".to_string(),
			item_path: "/v1/users/{id}".to_string(),
			timeout_ms: 1_000,
			default_headers: Map::new(),
		},
		storage: Storage {
			backend: IndexBackend::Local,
			namespace: "hobbies".to_string(),
			vector_dim: TEST_VECTOR_DIM,
			local: Some(LocalStorage { data_dir: data_dir.to_path_buf() }),
			qdrant: None,
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "hash".to_string(),
				dimensions: TEST_VECTOR_DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			llm_extractor: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "scripted".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		projection: Projection::default(),
		retrieval: Retrieval { top_k: 50, score_threshold: 0.1 },
		sync: IndexSync { max_concurrency: 4 },
		resolve: Resolution { max_concurrency: 4 },
		pipeline: Pipeline { deadline_ms: None, schema_retries: 1 },
	}
}

/// Same as [`test_config`] but pointed at a Qdrant collection.
pub fn qdrant_test_config(url: &str, namespace: &str) -> Config {
	let mut cfg = test_config(Path::new("."));

	cfg.storage.backend = IndexBackend::Qdrant;
	cfg.storage.namespace = namespace.to_string();
	cfg.storage.local = None;
	cfg.storage.qdrant =
		Some(Qdrant { url: url.to_string(), collection_prefix: "tether_test".to_string() });

	cfg
}

/// A user-shaped record with the searchable text in `about_me`.
pub fn user(id: RecordId, about_me: &str) -> Record {
	let mut attributes = Map::new();

	attributes.insert("name".to_string(), Value::String(format!("User {id}")));
	attributes.insert("about_me".to_string(), Value::String(about_me.to_string()));

	Record::new(id, attributes)
}

pub fn providers(
	embedding: Arc<HashEmbedding>,
	extractor: Arc<ScriptedExtractor>,
	source: Arc<InMemorySource>,
) -> tether_service::Providers {
	tether_service::Providers::new(embedding, extractor, source)
}
