//! HTTP client for the authoritative record service.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use tether_config::Source;
use tether_domain::{Record, RecordId};

use crate::{Error, Result};

/// Every record currently held by the source, in the order the service returns them.
pub async fn fetch_all(cfg: &Source) -> Result<Vec<Record>> {
	let url = format!("{}{}", cfg.api_base, cfg.list_path);
	let res = client(cfg)?
		.get(&url)
		.headers(crate::default_header_map(&cfg.default_headers)?)
		.send()
		.await?;
	let records: Vec<Record> = res.error_for_status()?.json().await?;

	tracing::debug!(count = records.len(), "Fetched source records.");

	Ok(records)
}

/// `Ok(None)` when the source does not know `id`; errors are reserved for transport and
/// decoding failures.
pub async fn fetch_by_id(cfg: &Source, id: RecordId) -> Result<Option<Record>> {
	let url = format!("{}{}", cfg.api_base, item_path(&cfg.item_path, id));
	let res = client(cfg)?
		.get(&url)
		.headers(crate::default_header_map(&cfg.default_headers)?)
		.send()
		.await?;

	if res.status() == StatusCode::NOT_FOUND {
		return Ok(None);
	}

	let record: Record = res.error_for_status()?.json().await?;

	if record.id != id {
		return Err(Error::InvalidResponse {
			message: format!("Source returned record {} when asked for {id}.", record.id),
		});
	}

	Ok(Some(record))
}

fn client(cfg: &Source) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?)
}

fn item_path(template: &str, id: RecordId) -> String {
	template.replace("{id}", &id.to_string())
}
