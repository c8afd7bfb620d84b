use serde::Serialize;
use serde_json::Value;

use tether_config::LlmProviderConfig;
use tether_domain::{Candidate, ExtractionResult, RecordId};

use crate::{Error, ExtractorProvider, Result};

#[derive(Serialize)]
struct PromptCandidate<'a> {
	id: RecordId,
	text: &'a str,
}

/// Asks the model to group `candidates` by what `query` asks for, then parses its answer.
/// Output that does not fit the schema is a `SchemaValidation` error, never coerced.
pub async fn extract(
	extractor: &dyn ExtractorProvider,
	cfg: &LlmProviderConfig,
	query: &str,
	candidates: &[Candidate],
) -> Result<ExtractionResult> {
	if candidates.is_empty() {
		tracing::debug!("No candidates to extract from.");

		return Ok(ExtractionResult::default());
	}

	let messages = build_extractor_messages(query, candidates)?;
	let content = extractor.extract(cfg, &messages).await?;

	parse_output(&content)
}

pub fn build_extractor_messages(query: &str, candidates: &[Candidate]) -> Result<Vec<Value>> {
	let schema = ExtractionResult::schema_hint();
	let system_prompt = "You match people to what a user is looking for. \
Output must be valid JSON only and must match the provided schema exactly. \
Choose short category labels that reflect the request, and list under each the ids of the candidates that belong there. \
Use only ids that appear in the candidate list. \
A candidate may be listed under more than one category. \
Leave out candidates that fit no category. If nothing fits, return an empty matches object.";
	let prompt_candidates: Vec<PromptCandidate<'_>> = candidates
		.iter()
		.map(|candidate| PromptCandidate { id: candidate.id, text: candidate.text.as_str() })
		.collect();
	let candidates_json =
		serde_json::to_string(&prompt_candidates).map_err(|_| Error::InvalidRequest {
			message: "Failed to serialize candidates for extractor.".to_string(),
		})?;
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema}\nRequest:\n{query}\nHere are the candidates as JSON:\n{candidates_json}"
	);

	Ok(vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	])
}

pub fn parse_output(content: &str) -> Result<ExtractionResult> {
	let body = strip_code_fence(content);
	let value: Value = serde_json::from_str(body).map_err(|err| Error::SchemaValidation {
		message: format!("Extractor output is not valid JSON: {err}."),
	})?;

	ExtractionResult::parse(value).map_err(|err| Error::SchemaValidation { message: err.message })
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let Some(body) = rest.strip_suffix("```") else {
		return trimmed;
	};
	// Drop an info string such as `json` on the opening fence line.
	let body = match body.split_once('\n') {
		Some((info, tail)) if !info.trim_start().starts_with('{') => tail,
		_ => body,
	};

	body.trim()
}
