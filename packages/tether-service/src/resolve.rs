//! Turns model-proposed ids into records that exist right now.
//!
//! Categories that end up with no surviving records are omitted from the result. Per-id
//! failures never fail the stage; an id that cannot be verified is simply left out.

use std::collections::{BTreeSet, HashMap, HashSet};

use futures::{StreamExt, stream};

use tether_config::Source;
use tether_domain::{ExtractionResult, GroundedResult, Record, RecordId};

use crate::RecordSource;

/// Fetches every distinct id once, then regroups the survivors by category.
///
/// Ids the source no longer has, and ids whose fetch fails, are dropped.
pub async fn resolve(
	source: &dyn RecordSource,
	cfg: &Source,
	extraction: &ExtractionResult,
	max_concurrency: usize,
) -> GroundedResult {
	let ids: BTreeSet<RecordId> =
		extraction.iter().flat_map(|(_, ids)| ids.iter().copied()).collect();
	let outcomes: Vec<(RecordId, color_eyre::Result<Option<Record>>)> = stream::iter(ids.iter().copied())
		.map(move |id| async move { (id, source.fetch_by_id(cfg, id).await) })
		.buffer_unordered(max_concurrency.max(1))
		.collect()
		.await;
	let mut found: HashMap<RecordId, Record> = HashMap::with_capacity(outcomes.len());
	let mut errors = 0;

	for (id, outcome) in outcomes {
		match outcome {
			Ok(Some(record)) => {
				found.insert(id, record);
			},
			Ok(None) => tracing::debug!(record_id = id, "Record not found; dropping id."),
			Err(err) => {
				tracing::warn!(record_id = id, error = %err, "Record fetch failed; dropping id.");

				errors += 1;
			},
		}
	}

	let grounded = group(extraction, &found);

	tracing::debug!(
		requested = ids.len(),
		resolved = found.len(),
		errors,
		categories = grounded.len(),
		"Resolved extraction."
	);

	grounded
}

/// Keeps first-occurrence order within a category and collapses repeats. The same record may
/// appear under several categories.
fn group(extraction: &ExtractionResult, found: &HashMap<RecordId, Record>) -> GroundedResult {
	let mut grounded = GroundedResult::new();

	for (label, ids) in extraction.iter() {
		let mut seen = HashSet::new();
		let records: Vec<Record> = ids
			.iter()
			.filter(|id| seen.insert(**id))
			.filter_map(|id| found.get(id).cloned())
			.collect();

		if records.is_empty() {
			continue;
		}

		grounded.insert(label.to_string(), records);
	}

	grounded
}

#[cfg(test)]
mod tests {
	use serde_json::Map;

	use super::*;

	fn found(ids: &[RecordId]) -> HashMap<RecordId, Record> {
		ids.iter().map(|id| (*id, Record::new(*id, Map::new()))).collect()
	}

	fn extraction(pairs: &[(&str, &[RecordId])]) -> ExtractionResult {
		pairs.iter().map(|(label, ids)| (label.to_string(), ids.to_vec())).collect()
	}

	fn ids_of(grounded: &GroundedResult, label: &str) -> Option<Vec<RecordId>> {
		grounded.get(label).map(|records| records.iter().map(|r| r.id).collect())
	}

	#[test]
	fn collapses_duplicates_in_first_occurrence_order() {
		let extracted = extraction(&[("camping", &[5, 2, 5, 1, 2][..])]);
		let grounded = group(&extracted, &found(&[1, 2, 5]));

		assert_eq!(ids_of(&grounded, "camping"), Some(vec![5, 2, 1]));
	}

	#[test]
	fn same_record_may_sit_in_several_categories() {
		let extracted = extraction(&[("hiking", &[1][..]), ("outdoors", &[1, 2][..])]);
		let grounded = group(&extracted, &found(&[1, 2]));

		assert_eq!(ids_of(&grounded, "hiking"), Some(vec![1]));
		assert_eq!(ids_of(&grounded, "outdoors"), Some(vec![1, 2]));
	}

	#[test]
	fn categories_without_survivors_are_omitted() {
		let extracted =
			extraction(&[("hiking", &[1, 99][..]), ("chess", &[98][..]), ("none", &[][..])]);
		let grounded = group(&extracted, &found(&[1]));

		assert_eq!(grounded.labels().collect::<Vec<_>>(), vec!["hiking"]);
		assert_eq!(ids_of(&grounded, "hiking"), Some(vec![1]));
	}
}
