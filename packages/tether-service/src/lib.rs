pub mod extract;
pub mod index;
pub mod query;
pub mod resolve;
pub mod retrieve;
pub mod sync;

mod error;

pub use error::{Error, QueryError, Result, Stage};
pub use index::{LocalIndex, QdrantIndex, SemanticIndex};
pub use query::{QueryResponse, Startup};
pub use sync::SyncReport;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use tokio::sync::Mutex;

use tether_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, Source};
use tether_domain::{Record, RecordId};
use tether_providers::{embedding, extractor, source};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

/// Returns the model's raw message content.
pub trait ExtractorProvider
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// The authoritative record store. `fetch_by_id` yields `Ok(None)` for unknown ids.
pub trait RecordSource
where
	Self: Send + Sync,
{
	fn fetch_all<'a>(&'a self, cfg: &'a Source) -> BoxFuture<'a, color_eyre::Result<Vec<Record>>>;

	fn fetch_by_id<'a>(
		&'a self,
		cfg: &'a Source,
		id: RecordId,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub extractor: Arc<dyn ExtractorProvider>,
	pub source: Arc<dyn RecordSource>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		extractor: Arc<dyn ExtractorProvider>,
		source: Arc<dyn RecordSource>,
	) -> Self {
		Self { embedding, extractor, source }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), extractor: provider.clone(), source: provider }
	}
}

pub struct TetherService {
	pub cfg: Config,
	pub index: Arc<dyn SemanticIndex>,
	pub providers: Providers,
	// Held across sync and search so readers never see a half-synced index.
	lock: Mutex<()>,
}
impl TetherService {
	pub fn new(cfg: Config, index: Arc<dyn SemanticIndex>) -> Self {
		Self::with_providers(cfg, index, Providers::default())
	}

	pub fn with_providers(cfg: Config, index: Arc<dyn SemanticIndex>, providers: Providers) -> Self {
		Self { cfg, index, providers, lock: Mutex::new(()) }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl ExtractorProvider for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(extractor::extract(cfg, messages))
	}
}
impl RecordSource for DefaultProviders {
	fn fetch_all<'a>(&'a self, cfg: &'a Source) -> BoxFuture<'a, color_eyre::Result<Vec<Record>>> {
		Box::pin(async move { Ok(source::fetch_all(cfg).await?) })
	}

	fn fetch_by_id<'a>(
		&'a self,
		cfg: &'a Source,
		id: RecordId,
	) -> BoxFuture<'a, color_eyre::Result<Option<Record>>> {
		Box::pin(async move { Ok(source::fetch_by_id(cfg, id).await?) })
	}
}

/// Identifies the vector space an index was built in.
pub fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id, cfg.providers.embedding.model, cfg.storage.vector_dim
	)
}
