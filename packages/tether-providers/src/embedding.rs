use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Deserialize;

use tether_config::EmbeddingProviderConfig;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` with an OpenAI-compatible `/embeddings` endpoint. Output order matches input
/// order.
pub async fn embed(cfg: &EmbeddingProviderConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let response: EmbeddingResponse = res.error_for_status()?.json().await?;
	let vectors = order_embeddings(response)?;

	check_shape(&vectors, texts.len(), cfg.dimensions as usize)?;

	Ok(vectors)
}

fn order_embeddings(response: EmbeddingResponse) -> Result<Vec<Vec<f32>>> {
	let mut indexed: Vec<(usize, Vec<f32>)> = response
		.data
		.into_iter()
		.enumerate()
		.map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
		.collect();

	indexed.sort_by_key(|(index, _)| *index);

	for (expected, (index, _)) in indexed.iter().enumerate() {
		if *index != expected {
			return Err(eyre::eyre!("Embedding response has a gap or duplicate at index {index}."));
		}
	}

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn check_shape(vectors: &[Vec<f32>], expected_len: usize, expected_dim: usize) -> Result<()> {
	if vectors.len() != expected_len {
		return Err(eyre::eyre!(
			"Embedding provider returned {} vectors for {expected_len} inputs.",
			vectors.len()
		));
	}
	if let Some(vec) = vectors.iter().find(|vec| vec.len() != expected_dim) {
		return Err(eyre::eyre!(
			"Embedding dimension {} does not match configured dimensions {expected_dim}.",
			vec.len()
		));
	}

	Ok(())
}
