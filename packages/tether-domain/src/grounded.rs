use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::{Record, RecordId};

/// Category label to records that existed in the source when they were resolved. Labels
/// iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GroundedResult {
	categories: BTreeMap<String, Vec<Record>>,
}
impl GroundedResult {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, label: String, records: Vec<Record>) {
		self.categories.insert(label, records);
	}

	pub fn get(&self, label: &str) -> Option<&[Record]> {
		self.categories.get(label).map(Vec::as_slice)
	}

	pub fn labels(&self) -> impl Iterator<Item = &str> {
		self.categories.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
		self.categories.iter().map(|(label, records)| (label.as_str(), records.as_slice()))
	}

	/// Distinct ids across every category.
	pub fn record_ids(&self) -> Vec<RecordId> {
		let mut ids: Vec<RecordId> =
			self.categories.values().flatten().map(|record| record.id).collect();

		ids.sort_unstable();
		ids.dedup();

		ids
	}

	pub fn len(&self) -> usize {
		self.categories.len()
	}

	pub fn is_empty(&self) -> bool {
		self.categories.is_empty()
	}
}
