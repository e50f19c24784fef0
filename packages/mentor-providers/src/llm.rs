use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};
use mentor_config::LlmProviderConfig;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
	System,
	User,
	Assistant,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatMessage {
	pub role: ChatRole,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: ChatRole::System, content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: ChatRole::User, content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: ChatRole::Assistant, content: content.into() }
	}
}

/// An image the model should look at, as an `https:` or `data:` URL.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ImageInput {
	pub url: String,
}
impl ImageInput {
	pub fn from_base64(media_type: &str, data: &str) -> Self {
		Self { url: format!("data:{media_type};base64,{data}") }
	}
}

#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
	pub messages: Vec<ChatMessage>,
	/// Attached to the last user message.
	pub images: Vec<ImageInput>,
	pub json_mode: bool,
	pub temperature: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
	pub text: String,
	pub model: String,
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
}

pub async fn complete(cfg: &LlmProviderConfig, req: &CompletionRequest) -> Result<Completion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = build_body(cfg, req);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json, &cfg.model)
}

fn build_body(cfg: &LlmProviderConfig, req: &CompletionRequest) -> Value {
	let last_user = req.messages.iter().rposition(|message| message.role == ChatRole::User);
	let messages: Vec<Value> = req
		.messages
		.iter()
		.enumerate()
		.map(|(idx, message)| {
			if Some(idx) == last_user && !req.images.is_empty() {
				let mut parts =
					vec![serde_json::json!({ "type": "text", "text": message.content })];

				for image in &req.images {
					parts.push(serde_json::json!({
						"type": "image_url",
						"image_url": { "url": image.url },
					}));
				}

				serde_json::json!({ "role": message.role, "content": parts })
			} else {
				serde_json::json!({ "role": message.role, "content": message.content })
			}
		})
		.collect();
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": req.temperature.unwrap_or(cfg.temperature),
		"max_tokens": cfg.max_tokens,
		"messages": messages,
	});

	if req.json_mode {
		body["response_format"] = serde_json::json!({ "type": "json_object" });
	}

	body
}

fn parse_completion(json: Value, requested_model: &str) -> Result<Completion> {
	let text = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})?;
	let model = json.get("model").and_then(|v| v.as_str()).unwrap_or(requested_model);
	let usage = json.get("usage");
	let count = |key: &str| {
		usage.and_then(|u| u.get(key)).and_then(|v| v.as_u64()).unwrap_or(0) as u32
	};

	Ok(Completion {
		text: text.to_string(),
		model: model.to_string(),
		prompt_tokens: count("prompt_tokens"),
		completion_tokens: count("completion_tokens"),
	})
}
