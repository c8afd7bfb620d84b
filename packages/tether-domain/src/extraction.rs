use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::RecordId;

/// Model output that does not have the `{"matches": {label: [id, ...]}}` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Extraction output violates schema: {message}")]
pub struct SchemaViolation {
	pub message: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
	matches: BTreeMap<String, Vec<RecordId>>,
}

/// Category label to raw ids, exactly as the model grouped them. Ids are unverified and labels
/// iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractionResult {
	matches: BTreeMap<String, Vec<RecordId>>,
}
impl ExtractionResult {
	/// Validates shape only: labels must be non-blank strings and every id a non-negative
	/// integer. Nothing is coerced.
	pub fn parse(value: Value) -> Result<Self, SchemaViolation> {
		let envelope: Envelope = serde_json::from_value(value)
			.map_err(|err| SchemaViolation { message: err.to_string() })?;

		if envelope.matches.keys().any(|label| label.trim().is_empty()) {
			return Err(SchemaViolation {
				message: "category labels must be non-empty".to_string(),
			});
		}

		Ok(Self { matches: envelope.matches })
	}

	/// The JSON shape the model is asked to produce.
	pub fn schema_hint() -> Value {
		serde_json::json!({ "matches": { "<category>": ["<record id: integer>"] } })
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
		self.matches.iter().map(|(label, ids)| (label.as_str(), ids.as_slice()))
	}

	pub fn get(&self, label: &str) -> Option<&[RecordId]> {
		self.matches.get(label).map(Vec::as_slice)
	}

	pub fn len(&self) -> usize {
		self.matches.len()
	}

	pub fn is_empty(&self) -> bool {
		self.matches.is_empty()
	}
}
impl FromIterator<(String, Vec<RecordId>)> for ExtractionResult {
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (String, Vec<RecordId>)>,
	{
		Self { matches: iter.into_iter().collect() }
	}
}
