use std::fmt::{Display, Formatter};

use serde::Serialize;

use tether_domain::RecordId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Source unavailable: {message}")]
	SourceUnavailable { message: String },
	#[error("Record {id} not found.")]
	RecordNotFound { id: RecordId },
	#[error("Schema validation failed: {message}")]
	SchemaValidation { message: String },
	#[error("Index persistence failed: {message}")]
	IndexPersistence { message: String },
	#[error("Index error: {message}")]
	Index { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Deadline exceeded while {stage}.")]
	Timeout { stage: Stage },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}
impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<tether_storage::Error> for Error {
	fn from(err: tether_storage::Error) -> Self {
		match err {
			tether_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Index { message: other.to_string() },
		}
	}
}

/// Pipeline stages in the order a query moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
	Validating,
	Syncing,
	Retrieving,
	Extracting,
	Resolving,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Validating => "validating",
			Self::Syncing => "syncing",
			Self::Retrieving => "retrieving",
			Self::Extracting => "extracting",
			Self::Resolving => "resolving",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A query that ended in the failed state, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
#[error("Query failed while {stage}: {error}")]
pub struct QueryError {
	pub stage: Stage,
	#[source]
	pub error: Error,
}
impl QueryError {
	pub fn new(stage: Stage, error: Error) -> Self {
		Self { stage, error }
	}

	pub fn is_schema_violation(&self) -> bool {
		matches!(self.error, Error::SchemaValidation { .. })
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self.error, Error::Timeout { .. })
	}
}
