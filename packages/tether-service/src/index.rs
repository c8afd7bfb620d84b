//! Semantic index backends. Both embed projection text through the configured
//! [`EmbeddingProvider`]; callers only ever hand them text.

use std::{
	collections::BTreeSet,
	sync::{Arc, Mutex, MutexGuard},
};

use tether_config::{Config, EmbeddingProviderConfig};
use tether_domain::{Candidate, RecordId};
use tether_storage::{ScoredEntry, local::LocalStore, qdrant::QdrantStore};

use crate::{BoxFuture, EmbeddingProvider, Error, Result};

pub trait SemanticIndex
where
	Self: Send + Sync,
{
	/// Adds or replaces the entry for `id`.
	fn upsert<'a>(&'a self, id: RecordId, text: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Removes exactly `ids`. Unknown ids are a no-op.
	fn delete<'a>(&'a self, ids: &'a BTreeSet<RecordId>) -> BoxFuture<'a, Result<()>>;

	/// Up to `k` nearest entries, best first.
	fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<Candidate>>>;

	fn current_ids(&self) -> BoxFuture<'_, Result<BTreeSet<RecordId>>>;

	/// Durably commits every change made so far.
	fn persist(&self) -> BoxFuture<'_, Result<()>>;
}

pub struct LocalIndex {
	store: Arc<Mutex<LocalStore>>,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
}
impl LocalIndex {
	pub fn open(cfg: &Config, embedding: Arc<dyn EmbeddingProvider>) -> Result<Self> {
		let Some(local) = cfg.storage.local.as_ref() else {
			return Err(Error::InvalidRequest {
				message: "storage.local is required for the local index.".to_string(),
			});
		};
		let store = LocalStore::open(
			&local.data_dir,
			&cfg.storage.namespace,
			&crate::embedding_version(cfg),
			cfg.storage.vector_dim,
		)?;

		tracing::info!(
			path = %store.path().display(),
			entries = store.len(),
			"Opened local index."
		);

		Ok(Self {
			store: Arc::new(Mutex::new(store)),
			embedding,
			embedding_cfg: cfg.providers.embedding.clone(),
		})
	}

	fn store(&self) -> MutexGuard<'_, LocalStore> {
		self.store.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl SemanticIndex for LocalIndex {
	fn upsert<'a>(&'a self, id: RecordId, text: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let vector = embed_one(self.embedding.as_ref(), &self.embedding_cfg, text).await?;

			self.store().put(id, vector, text.to_string())?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, ids: &'a BTreeSet<RecordId>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let removed = self.store().remove(ids.iter().copied());

			tracing::debug!(requested = ids.len(), removed, "Deleted index entries.");

			Ok(())
		})
	}

	fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move {
			if k == 0 {
				return Ok(Vec::new());
			}

			let vector = embed_one(self.embedding.as_ref(), &self.embedding_cfg, query).await?;
			let hits = self.store().search(&vector, k)?;

			Ok(hits.into_iter().map(to_candidate).collect())
		})
	}

	fn current_ids(&self) -> BoxFuture<'_, Result<BTreeSet<RecordId>>> {
		Box::pin(async move { Ok(self.store().ids()) })
	}

	fn persist(&self) -> BoxFuture<'_, Result<()>> {
		// Blocking file I/O.
		let store = self.store.clone();

		Box::pin(async move {
			tokio::task::spawn_blocking(move || {
				store.lock().unwrap_or_else(|err| err.into_inner()).commit()
			})
			.await
			.map_err(|err| Error::IndexPersistence { message: err.to_string() })?
			.map_err(|err| Error::IndexPersistence { message: err.to_string() })
		})
	}
}

pub struct QdrantIndex {
	store: QdrantStore,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
	embedding_version: String,
}
impl QdrantIndex {
	pub async fn connect(cfg: &Config, embedding: Arc<dyn EmbeddingProvider>) -> Result<Self> {
		let Some(qdrant) = cfg.storage.qdrant.as_ref() else {
			return Err(Error::InvalidRequest {
				message: "storage.qdrant is required for the Qdrant index.".to_string(),
			});
		};
		let store = QdrantStore::new(qdrant, &cfg.storage.namespace, cfg.storage.vector_dim)?;

		store.ensure_collection().await?;

		tracing::info!(collection = %store.collection, "Connected Qdrant index.");

		Ok(Self {
			store,
			embedding,
			embedding_cfg: cfg.providers.embedding.clone(),
			embedding_version: crate::embedding_version(cfg),
		})
	}
}
impl SemanticIndex for QdrantIndex {
	fn upsert<'a>(&'a self, id: RecordId, text: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let vector = embed_one(self.embedding.as_ref(), &self.embedding_cfg, text).await?;

			self.store.upsert(id, vector, text, &self.embedding_version).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, ids: &'a BTreeSet<RecordId>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let ids: Vec<RecordId> = ids.iter().copied().collect();

			self.store.delete(&ids).await?;

			Ok(())
		})
	}

	fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move {
			if k == 0 {
				return Ok(Vec::new());
			}

			let vector = embed_one(self.embedding.as_ref(), &self.embedding_cfg, query).await?;
			let hits = self.store.search(vector, k as u64).await?;

			Ok(hits.into_iter().map(to_candidate).collect())
		})
	}

	fn current_ids(&self) -> BoxFuture<'_, Result<BTreeSet<RecordId>>> {
		Box::pin(async move { Ok(self.store.ids().await?) })
	}

	// Points are written with `wait(true)`, so an acknowledged upsert is already durable. This
	// confirms the collection still answers before the sync is reported as committed.
	fn persist(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let points = self
				.store
				.count()
				.await
				.map_err(|err| Error::IndexPersistence { message: err.to_string() })?;

			tracing::debug!(collection = %self.store.collection, points, "Qdrant index committed.");

			Ok(())
		})
	}
}

async fn embed_one(
	embedding: &dyn EmbeddingProvider,
	cfg: &EmbeddingProviderConfig,
	text: &str,
) -> Result<Vec<f32>> {
	let texts = [text.to_string()];
	let vectors = embedding.embed(cfg, &texts).await?;
	let Some(vector) = vectors.into_iter().next() else {
		return Err(Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		});
	};

	if vector.len() != cfg.dimensions as usize {
		return Err(Error::Provider { message: "Embedding vector dimension mismatch.".to_string() });
	}

	Ok(vector)
}

fn to_candidate(hit: ScoredEntry) -> Candidate {
	Candidate { id: hit.id, text: hit.text, score: hit.score }
}
