use std::{
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use tokio::time;

use tether_config::EmbeddingProviderConfig;
use tether_service::{BoxFuture, EmbeddingProvider};

// Projection labels present in every entry.
const SKIPPED_TOKENS: [&str; 2] = ["id", "about"];

/// Deterministic bag-of-words embedding. Each word is hashed into one of `cfg.dimensions`
/// buckets, so texts sharing words score higher under cosine similarity.
#[derive(Default)]
pub struct HashEmbedding {
	texts: AtomicUsize,
	fail_on: Mutex<Vec<String>>,
	delay_on: Mutex<Vec<(String, Duration)>>,
}
impl HashEmbedding {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every later call fail when any input contains `needle`.
	pub fn fail_on(&self, needle: &str) {
		self.fail_on.lock().unwrap_or_else(|err| err.into_inner()).push(needle.to_string());
	}

	/// Makes every later call that includes `needle` take `delay` before answering.
	pub fn delay_on(&self, needle: &str, delay: Duration) {
		let mut delays = self.delay_on.lock().unwrap_or_else(|err| err.into_inner());

		delays.push((needle.to_string(), delay));
	}

	/// Number of texts embedded so far.
	pub fn texts_embedded(&self) -> usize {
		self.texts.load(Ordering::SeqCst)
	}

	pub fn vector(text: &str, dimensions: usize) -> Vec<f32> {
		let mut vector = vec![0.0; dimensions.max(1)];

		for token in text
			.split(|ch: char| !ch.is_alphanumeric())
			.map(str::to_lowercase)
			.filter(|token| !token.is_empty())
			.filter(|token| !token.chars().all(|ch| ch.is_ascii_digit()))
			.filter(|token| !SKIPPED_TOKENS.contains(&token.as_str()))
		{
			let bucket = (fnv1a(token.as_bytes()) % vector.len() as u64) as usize;

			vector[bucket] += 1.0;
		}

		vector
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let failing = self.fail_on.lock().unwrap_or_else(|err| err.into_inner()).clone();

			if let Some(needle) =
				failing.iter().find(|needle| texts.iter().any(|text| text.contains(needle.as_str())))
			{
				return Err(eyre::eyre!("Embedding rejected input containing {needle:?}."));
			}

			let delay = self
				.delay_on
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.iter()
				.filter(|(needle, _)| texts.iter().any(|text| text.contains(needle.as_str())))
				.map(|(_, delay)| *delay)
				.max();

			if let Some(delay) = delay {
				time::sleep(delay).await;
			}

			self.texts.fetch_add(texts.len(), Ordering::SeqCst);

			Ok(texts.iter().map(|text| Self::vector(text, cfg.dimensions as usize)).collect())
		})
	}
}

fn fnv1a(bytes: &[u8]) -> u64 {
	let mut hash = 0xcbf2_9ce4_8422_2325_u64;

	for byte in bytes {
		hash ^= u64::from(*byte);
		hash = hash.wrapping_mul(0x0100_0000_01b3);
	}

	hash
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shared_words_land_in_the_same_bucket() {
		let a = HashEmbedding::vector("id: 1\nabout: Hiking\n", 64);
		let b = HashEmbedding::vector("hiking", 64);

		assert_eq!(a, b);
		assert_eq!(a.iter().sum::<f32>(), 1.0);
	}

	#[test]
	fn scaffolding_only_text_is_a_zero_vector() {
		assert!(HashEmbedding::vector("id: 3\nabout: \n", 16).iter().all(|value| *value == 0.0));
	}
}
