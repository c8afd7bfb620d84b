use crate::record::Record;

/// Compact text used for embedding. Carries the id and the searchable text only; whitespace
/// runs are collapsed so the text always stays on its own line.
pub fn project(record: &Record, text_fields: &[String]) -> String {
	let about = record.searchable_text(text_fields).unwrap_or_default();
	let about = about.split_whitespace().collect::<Vec<_>>().join(" ");

	format!("id: {}\nabout: {about}\n", record.id)
}
