mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, IndexBackend, IndexSync, LlmProviderConfig, LocalStorage,
	Pipeline, Projection, Providers, Qdrant, Resolution, Retrieval, Service, Source, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	validate_source(cfg)?;
	validate_storage(cfg)?;
	validate_providers(cfg)?;

	if cfg.projection.text_fields.iter().all(|field| field.trim().is_empty()) {
		return Err(Error::Validation {
			message: "projection.text_fields must name at least one field.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.retrieval.score_threshold.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.score_threshold must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.score_threshold) {
		return Err(Error::Validation {
			message: "retrieval.score_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.sync.max_concurrency == 0 {
		return Err(Error::Validation {
			message: "sync.max_concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.resolve.max_concurrency == 0 {
		return Err(Error::Validation {
			message: "resolve.max_concurrency must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_source(cfg: &Config) -> Result<()> {
	if cfg.source.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "source.api_base must be non-empty.".to_string(),
		});
	}
	if !cfg.source.list_path.starts_with('/') {
		return Err(Error::Validation {
			message: "source.list_path must start with '/'.".to_string(),
		});
	}
	if !cfg.source.item_path.starts_with('/') || !cfg.source.item_path.contains("{id}") {
		return Err(Error::Validation {
			message: "source.item_path must start with '/' and contain the {id} placeholder."
				.to_string(),
		});
	}
	if cfg.source.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "source.timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_storage(cfg: &Config) -> Result<()> {
	let namespace = cfg.storage.namespace.as_str();

	if namespace.is_empty() {
		return Err(Error::Validation {
			message: "storage.namespace must be non-empty.".to_string(),
		});
	}
	if !namespace.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
		return Err(Error::Validation {
			message: "storage.namespace may only contain ASCII letters, digits, '_' and '-'."
				.to_string(),
		});
	}
	if cfg.storage.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.vector_dim must be greater than zero.".to_string(),
		});
	}

	match cfg.storage.backend {
		IndexBackend::Local =>
			if cfg.storage.local.is_none() {
				return Err(Error::Validation {
					message: "storage.local is required when storage.backend is local.".to_string(),
				});
			},
		IndexBackend::Qdrant => {
			let Some(qdrant) = cfg.storage.qdrant.as_ref() else {
				return Err(Error::Validation {
					message: "storage.qdrant is required when storage.backend is qdrant."
						.to_string(),
				});
			};

			if qdrant.url.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.qdrant.url must be non-empty.".to_string(),
				});
			}
		},
	}

	Ok(())
}

fn validate_providers(cfg: &Config) -> Result<()> {
	let embedding = &cfg.providers.embedding;
	let llm = &cfg.providers.llm_extractor;

	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if !llm.temperature.is_finite() || llm.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm_extractor.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	for (label, api_base, key, timeout_ms) in [
		("embedding", &embedding.api_base, &embedding.api_key, embedding.timeout_ms),
		("llm_extractor", &llm.api_base, &llm.api_key, llm.timeout_ms),
	] {
		if api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_base must be non-empty."),
			});
		}
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	trim_trailing_slash(&mut cfg.source.api_base);
	trim_trailing_slash(&mut cfg.providers.embedding.api_base);
	trim_trailing_slash(&mut cfg.providers.llm_extractor.api_base);

	if let Some(qdrant) = cfg.storage.qdrant.as_mut() {
		trim_trailing_slash(&mut qdrant.url);
	}
	if cfg.pipeline.deadline_ms == Some(0) {
		cfg.pipeline.deadline_ms = None;
	}

	cfg.projection.text_fields.retain(|field| !field.trim().is_empty());
}

fn trim_trailing_slash(value: &mut String) {
	while value.ends_with('/') {
		value.pop();
	}
}
