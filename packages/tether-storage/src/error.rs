use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to access index store at {path:?}.")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Index store at {path:?} is corrupt: {message}")]
	Corrupt { path: PathBuf, message: String },
	#[error(
		"Index store at {path:?} was built with embedding version {stored:?}, expected {expected:?}."
	)]
	VersionMismatch { path: PathBuf, stored: String, expected: String },
	#[error("Qdrant collection {collection:?} has {stored}-dimensional vectors, expected {expected}.")]
	DimensionMismatch { collection: String, stored: u64, expected: u64 },
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
