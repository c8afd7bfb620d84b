use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub source: Source,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub projection: Projection,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub sync: IndexSync,
	#[serde(default)]
	pub resolve: Resolution,
	#[serde(default)]
	pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

/// The authoritative record service.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
	pub api_base: String,
	#[serde(default = "default_list_path")]
	pub list_path: String,
	/// Must contain the `{id}` placeholder.
	#[serde(default = "default_item_path")]
	pub item_path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
	Local,
	Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub backend: IndexBackend,
	/// Keys the durable index; one namespace per task.
	pub namespace: String,
	pub vector_dim: u32,
	pub local: Option<LocalStorage>,
	pub qdrant: Option<Qdrant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorage {
	pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	#[serde(default = "default_collection_prefix")]
	pub collection_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm_extractor: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Projection {
	/// Record attributes consulted, in order, for the searchable text.
	pub text_fields: Vec<String>,
}
impl Default for Projection {
	fn default() -> Self {
		Self { text_fields: vec!["about".to_string(), "about_me".to_string()] }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
	pub score_threshold: f32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 50, score_threshold: 0.1 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSync {
	pub max_concurrency: usize,
}
impl Default for IndexSync {
	fn default() -> Self {
		Self { max_concurrency: 8 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Resolution {
	pub max_concurrency: usize,
}
impl Default for Resolution {
	fn default() -> Self {
		Self { max_concurrency: 8 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	/// Per-query budget across all stages. Zero or absent disables it.
	pub deadline_ms: Option<u64>,
	pub schema_retries: u32,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self { deadline_ms: None, schema_retries: 1 }
	}
}

fn default_list_path() -> String {
	"/v1/users".to_string()
}

fn default_item_path() -> String {
	"/v1/users/{id}".to_string()
}

fn default_collection_prefix() -> String {
	"tether".to_string()
}
