use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, MentorService, Result};
use mentor_domain::difficulty::{self, Scale, Trend};

#[derive(Clone, Debug, Deserialize)]
pub struct DifficultyRequest {
	pub student_id: Uuid,
	pub subject: String,
	#[serde(default)]
	pub scale: Scale,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DifficultyResponse {
	pub difficulty: u8,
	pub scale: Scale,
	/// `0.0` for students with no readings in the subject.
	pub mastery: f32,
	pub trend: Trend,
	pub weakest_topic: Option<String>,
}

impl MentorService {
	pub async fn recommend_difficulty(&self, req: DifficultyRequest) -> Result<DifficultyResponse> {
		let subject = req.subject.trim();

		if subject.is_empty() {
			return Err(Error::invalid("subject must be non-empty."));
		}

		let context = self.mastery_context(req.student_id, subject).await?;
		let (mastery, trend, weakest_topic) = match context {
			Some(context) => (context.level, context.trend, context.weakest_topic),
			None => (0.0, Trend::Flat, None),
		};

		Ok(DifficultyResponse {
			difficulty: difficulty::recommend(mastery, trend, req.scale),
			scale: req.scale,
			mastery,
			trend,
			weakest_topic,
		})
	}
}
