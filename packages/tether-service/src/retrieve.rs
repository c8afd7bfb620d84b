use tether_domain::Candidate;

use crate::{Result, SemanticIndex};

/// Nearest neighbors of `query` whose score clears `score_threshold`, best first. Nothing
/// clearing the threshold is an empty list, not an error.
pub async fn retrieve(
	index: &dyn SemanticIndex,
	query: &str,
	k: usize,
	score_threshold: f32,
) -> Result<Vec<Candidate>> {
	let hits = index.search(query, k).await?;
	let total = hits.len();
	let candidates = apply_threshold(hits, score_threshold);

	tracing::debug!(hits = total, kept = candidates.len(), "Retrieved candidates.");

	Ok(candidates)
}

fn apply_threshold(hits: Vec<Candidate>, score_threshold: f32) -> Vec<Candidate> {
	hits.into_iter().filter(|hit| hit.score >= score_threshold).collect()
}
