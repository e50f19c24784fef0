use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Pulls the JSON payload out of model output that may wrap it in prose or a code fence.
pub fn extract_json(text: &str) -> &str {
	if let Some(start) = text.find("```json") {
		let body = &text[start + 7..];

		if let Some(end) = body.find("```") {
			return body[..end].trim();
		}
	}
	if let Some(start) = text.find("```") {
		let body = &text[start + 3..];

		if let Some(end) = body.find("```") {
			return body[..end].trim();
		}
	}
	if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
		&& start < end
	{
		return &text[start..=end];
	}

	text.trim()
}

pub fn parse_structured<T>(text: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	let payload = extract_json(text);

	serde_json::from_str(payload).map_err(|err| Error::InvalidResponse {
		message: format!("Model output is not the expected JSON shape: {err}"),
	})
}
