mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chat, Config, EmbeddingProviderConfig, Escalation, LlmProviderConfig, Mastery, Postgres,
	Practice, Providers, Retrieval, Service, Storage,
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
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	validate_llm("providers.llm", &cfg.providers.llm)?;

	if let Some(fallback) = cfg.providers.llm_fallback.as_ref() {
		validate_llm("providers.llm_fallback", fallback)?;
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("llm", &cfg.providers.llm.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	validate_retrieval(cfg)?;
	validate_mastery(cfg)?;
	validate_escalation(cfg)?;
	validate_chat(cfg)?;

	if !(0.0..=2.0).contains(&cfg.practice.grade_temperature) {
		return Err(Error::Validation {
			message: "practice.grade_temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.practice.max_attempts_before_reveal == 0 {
		return Err(Error::Validation {
			message: "practice.max_attempts_before_reveal must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_llm(label: &str, llm: &LlmProviderConfig) -> Result<()> {
	if !llm.temperature.is_finite() || !(0.0..=2.0).contains(&llm.temperature) {
		return Err(Error::Validation {
			message: format!("{label}.temperature must be in the range 0.0-2.0."),
		});
	}
	if llm.max_tokens == 0 {
		return Err(Error::Validation {
			message: format!("{label}.max_tokens must be greater than zero."),
		});
	}
	if llm.timeout_ms == 0 {
		return Err(Error::Validation {
			message: format!("{label}.timeout_ms must be greater than zero."),
		});
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !retrieval.threshold.is_finite() || retrieval.threshold < 0.0 {
		return Err(Error::Validation {
			message: "retrieval.threshold must be a finite number, zero or greater.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&retrieval.jaccard_weight) {
		return Err(Error::Validation {
			message: "retrieval.jaccard_weight must be in the range 0.0-1.0.".to_string(),
		});
	}
	if retrieval.pair_window == 0 || retrieval.turn_limit == 0 {
		return Err(Error::Validation {
			message: "retrieval.pair_window and retrieval.turn_limit must be greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_mastery(cfg: &Config) -> Result<()> {
	let mastery = &cfg.mastery;

	if !(0.0..=100.0).contains(&mastery.initial_max) {
		return Err(Error::Validation {
			message: "mastery.initial_max must be in the range 0.0-100.0.".to_string(),
		});
	}
	if mastery.decay_gap_days <= 0 {
		return Err(Error::Validation {
			message: "mastery.decay_gap_days must be greater than zero.".to_string(),
		});
	}
	if mastery.decay_min < 0.0 || mastery.decay_min > mastery.decay_max {
		return Err(Error::Validation {
			message: "mastery.decay_min must be zero or greater and at most mastery.decay_max."
				.to_string(),
		});
	}
	if mastery.progression_max < 0.0 {
		return Err(Error::Validation {
			message: "mastery.progression_max must be zero or greater.".to_string(),
		});
	}
	if mastery.trend_window < 2 {
		return Err(Error::Validation {
			message: "mastery.trend_window must be at least 2.".to_string(),
		});
	}

	Ok(())
}

fn validate_escalation(cfg: &Config) -> Result<()> {
	let escalation = &cfg.escalation;

	for (label, value) in [
		("escalation.short_circuit_confidence", escalation.short_circuit_confidence),
		("escalation.event_confidence", escalation.event_confidence),
		("escalation.high_urgency_confidence", escalation.high_urgency_confidence),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if escalation.short_circuit_confidence > escalation.event_confidence
		|| escalation.event_confidence > escalation.high_urgency_confidence
	{
		return Err(Error::Validation {
			message: "escalation thresholds must satisfy short_circuit_confidence <= event_confidence <= high_urgency_confidence."
				.to_string(),
		});
	}
	if escalation.interaction_turn_limit == 0 || escalation.no_progress_attempts == 0 {
		return Err(Error::Validation {
			message: "escalation.interaction_turn_limit and escalation.no_progress_attempts must be greater than zero."
				.to_string(),
		});
	}
	if escalation.classifier_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "escalation.classifier_timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_chat(cfg: &Config) -> Result<()> {
	let chat = &cfg.chat;

	if chat.min_sentences == 0 {
		return Err(Error::Validation {
			message: "chat.min_sentences must be greater than zero.".to_string(),
		});
	}
	if chat.max_sentences < chat.min_sentences {
		return Err(Error::Validation {
			message: "chat.max_sentences must be at least chat.min_sentences.".to_string(),
		});
	}
	if chat.repeat_threshold < 2 {
		return Err(Error::Validation {
			message: "chat.repeat_threshold must be at least 2.".to_string(),
		});
	}
	if chat.repeat_window == 0 || chat.max_message_chars == 0 {
		return Err(Error::Validation {
			message: "chat.repeat_window and chat.max_message_chars must be greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.providers.llm_fallback.as_ref().map(|llm| llm.api_key.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.llm_fallback = None;
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
