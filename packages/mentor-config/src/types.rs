use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub mastery: Mastery,
	#[serde(default)]
	pub escalation: Escalation,
	#[serde(default)]
	pub chat: Chat,
	#[serde(default)]
	pub practice: Practice,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
	/// Optional. Tried once when the primary vendor fails.
	pub llm_fallback: Option<LlmProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
	pub threshold: f32,
	pub summary_limit: u32,
	pub turn_limit: u32,
	pub pair_window: u32,
	/// Share of the lexical score taken by Jaccard; the remainder goes to term overlap.
	pub jaccard_weight: f32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			top_k: 5,
			threshold: 0.7,
			summary_limit: 50,
			turn_limit: 100,
			pair_window: 20,
			jaccard_weight: 0.7,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Mastery {
	pub initial_max: f32,
	pub decay_gap_days: i64,
	pub decay_min: f32,
	pub decay_max: f32,
	pub progression_max: f32,
	/// Optional. Fixes the progression RNG; leave unset in production.
	pub seed: Option<u64>,
	pub trend_window: u32,
}
impl Default for Mastery {
	fn default() -> Self {
		Self {
			initial_max: 20.0,
			decay_gap_days: 90,
			decay_min: 3.0,
			decay_max: 5.0,
			progression_max: 5.0,
			seed: None,
			trend_window: 3,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Escalation {
	pub short_circuit_confidence: f32,
	pub event_confidence: f32,
	pub high_urgency_confidence: f32,
	pub interaction_turn_limit: u32,
	pub no_progress_attempts: u32,
	pub frustration_window: u32,
	pub classifier_turns: u32,
	pub classifier_timeout_ms: u64,
}
impl Default for Escalation {
	fn default() -> Self {
		Self {
			short_circuit_confidence: 0.6,
			event_confidence: 0.7,
			high_urgency_confidence: 0.8,
			interaction_turn_limit: 10,
			no_progress_attempts: 3,
			frustration_window: 5,
			classifier_turns: 10,
			classifier_timeout_ms: 8_000,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Chat {
	pub max_sentences: u32,
	pub min_sentences: u32,
	pub repeat_threshold: u32,
	pub repeat_window: u32,
	pub homework_note_turns: u32,
	pub history_turns: u32,
	pub max_message_chars: u32,
	pub max_attachments: u32,
}
impl Default for Chat {
	fn default() -> Self {
		Self {
			max_sentences: 4,
			min_sentences: 2,
			repeat_threshold: 10,
			repeat_window: 30,
			homework_note_turns: 8,
			history_turns: 10,
			max_message_chars: 4_000,
			max_attachments: 4,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Practice {
	pub struggle_window: u32,
	pub refine_struggle_with_llm: bool,
	pub grade_temperature: f32,
	pub max_attempts_before_reveal: u32,
}
impl Default for Practice {
	fn default() -> Self {
		Self {
			struggle_window: 20,
			refine_struggle_with_llm: false,
			grade_temperature: 0.0,
			max_attempts_before_reveal: 3,
		}
	}
}
