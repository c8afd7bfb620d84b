use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type RecordId = u64;

/// A record owned by the source service. Only `id` is interpreted; every other attribute is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
	pub id: RecordId,
	#[serde(flatten)]
	pub attributes: Map<String, Value>,
}
impl Record {
	pub fn new(id: RecordId, attributes: Map<String, Value>) -> Self {
		Self { id, attributes }
	}

	/// First non-blank string among `fields`, in order.
	pub fn searchable_text<'a>(&'a self, fields: &[String]) -> Option<&'a str> {
		fields.iter().find_map(|field| {
			self.attributes
				.get(field)
				.and_then(Value::as_str)
				.filter(|text| !text.trim().is_empty())
		})
	}
}

/// An index hit that cleared the retrieval threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub id: RecordId,
	pub text: String,
	pub score: f32,
}
