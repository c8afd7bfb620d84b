use std::collections::{BTreeSet, HashMap};

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		CollectionInfo, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
		PointId, PointStruct, PointsIdsList, Query, QueryPointsBuilder, ScrollPointsBuilder,
		UpsertPointsBuilder, Value, VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
		vectors_config,
	},
};

use crate::{Error, Result, ScoredEntry};

const SCROLL_PAGE: u32 = 256;

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &tether_config::Qdrant, namespace: &str, vector_dim: u32) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;
		let collection = collection_name(&cfg.collection_prefix, namespace);

		Ok(Self { client, collection, vector_dim })
	}

	/// Creates the collection when missing. Returns `true` if it was created. An existing
	/// collection must have been created with the same vector size.
	pub async fn ensure_collection(&self) -> Result<bool> {
		if self.client.collection_exists(self.collection.clone()).await? {
			let info = self.client.collection_info(self.collection.clone()).await?.result;

			if let Some(stored) = info.as_ref().and_then(vector_size)
				&& stored != u64::from(self.vector_dim)
			{
				return Err(Error::DimensionMismatch {
					collection: self.collection.clone(),
					stored,
					expected: self.vector_dim.into(),
				});
			}

			return Ok(false);
		}

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine));

		self.client.create_collection(builder).await?;

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(true)
	}

	pub async fn upsert(
		&self,
		id: u64,
		vector: Vec<f32>,
		text: &str,
		embedding_version: &str,
	) -> Result<()> {
		let mut payload_map = HashMap::new();

		payload_map.insert("id".to_string(), Value::from(id as i64));
		payload_map.insert("text".to_string(), Value::from(text.to_string()));
		payload_map
			.insert("embedding_version".to_string(), Value::from(embedding_version.to_string()));

		let point = PointStruct::new(id, vector, Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Absent ids are ignored by Qdrant.
	pub async fn delete(&self, ids: &[u64]) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}

		let ids = ids.iter().map(|id| PointId::from(*id)).collect();
		let delete = DeletePointsBuilder::new(self.collection.clone())
			.points(PointsIdsList { ids })
			.wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	pub async fn ids(&self) -> Result<BTreeSet<u64>> {
		let mut out = BTreeSet::new();
		let mut offset: Option<PointId> = None;

		loop {
			let mut scroll = ScrollPointsBuilder::new(self.collection.clone())
				.limit(SCROLL_PAGE)
				.with_payload(false)
				.with_vectors(false);

			if let Some(offset) = offset.take() {
				scroll = scroll.offset(offset);
			}

			let response = self.client.scroll(scroll).await?;

			out.extend(
				response.result.iter().filter_map(|point| point.id.as_ref().and_then(numeric_id)),
			);

			match response.next_page_offset {
				Some(next) => offset = Some(next),
				None => break,
			}
		}

		Ok(out)
	}

	pub async fn search(&self, vector: Vec<f32>, k: u64) -> Result<Vec<ScoredEntry>> {
		let query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.limit(k)
			.with_payload(true);
		let response = self.client.query(query).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(id) = point.id.as_ref().and_then(numeric_id) else {
				tracing::warn!("Qdrant hit has a non-numeric id.");

				continue;
			};
			let text = payload_string(&point.payload, "text").unwrap_or_default();

			out.push(ScoredEntry { id, text, score: point.score });
		}

		Ok(out)
	}

	/// Points currently stored, exact.
	pub async fn count(&self) -> Result<u64> {
		let count = CountPointsBuilder::new(self.collection.clone()).exact(true);
		let response = self.client.count(count).await?;

		Ok(response.result.map(|result| result.count).unwrap_or(0))
	}
}

pub fn collection_name(prefix: &str, namespace: &str) -> String {
	format!("{prefix}_{namespace}")
}

/// Size of the unnamed vector, if the collection has one.
fn vector_size(info: &CollectionInfo) -> Option<u64> {
	let config = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?.config.as_ref()?;

	match config {
		vectors_config::Config::Params(params) => Some(params.size),
		vectors_config::Config::ParamsMap(_) => None,
	}
}

fn numeric_id(point_id: &PointId) -> Option<u64> {
	match point_id.point_id_options.as_ref()? {
		PointIdOptions::Num(id) => Some(*id),
		PointIdOptions::Uuid(_) => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::StringValue(text) => Some(text.clone()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use qdrant_client::qdrant::{
		CollectionConfig, CollectionParams, VectorParams, VectorParamsMap, VectorsConfig,
	};

	use super::*;

	fn info_with(config: vectors_config::Config) -> CollectionInfo {
		CollectionInfo {
			config: Some(CollectionConfig {
				params: Some(CollectionParams {
					vectors_config: Some(VectorsConfig { config: Some(config) }),
					..Default::default()
				}),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn collection_is_prefixed_by_namespace() {
		assert_eq!(collection_name("tether", "hobbies"), "tether_hobbies");
	}

	#[test]
	fn only_numeric_point_ids_map_to_records() {
		let uuid = PointId::from("6f1c1f0e-0000-4000-8000-000000000000".to_string());

		assert_eq!(numeric_id(&PointId::from(7_u64)), Some(7));
		assert_eq!(numeric_id(&uuid), None);
	}

	#[test]
	fn reads_unnamed_vector_size_from_collection_info() {
		let params = VectorParams { size: 384, ..Default::default() };
		let unnamed = info_with(vectors_config::Config::Params(params));
		let named = info_with(vectors_config::Config::ParamsMap(VectorParamsMap::default()));

		assert_eq!(vector_size(&unnamed), Some(384));
		assert_eq!(vector_size(&named), None);
		assert_eq!(vector_size(&CollectionInfo::default()), None);
	}
}
