pub mod local;
pub mod qdrant;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A nearest-neighbor hit, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
	pub id: u64,
	pub text: String,
	pub score: f32,
}
