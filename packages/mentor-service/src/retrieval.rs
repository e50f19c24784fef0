use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{Error, MentorService, Result};
use mentor_domain::similarity;
use mentor_storage::models::{ConversationTurn, Role, SummaryFilter, TurnFilter};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
	SessionSummary,
	Conversation,
}
impl ChunkSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::SessionSummary => "session_summary",
			Self::Conversation => "conversation",
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ContextChunk {
	pub source: ChunkSource,
	pub text: String,
	pub similarity: f32,
	pub metadata: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetrievalRequest {
	pub student_id: Uuid,
	pub query: String,
	pub top_k: Option<u32>,
	pub threshold: Option<f32>,
	pub subject: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetrievalResponse {
	pub chunks: Vec<ContextChunk>,
}

struct TurnPair<'a> {
	student: &'a ConversationTurn,
	companion: &'a ConversationTurn,
}

impl MentorService {
	pub async fn retrieve(&self, req: RetrievalRequest) -> Result<RetrievalResponse> {
		validate_request(&req)?;

		let query_vec = self.embed_text(&req.query).await;
		let chunks = self.retrieve_with_vector(&req, query_vec.as_deref()).await?;

		Ok(RetrievalResponse { chunks })
	}

	/// Ranks summaries and conversation pairs against `query`, scoring each candidate by cosine
	/// when both sides carry comparable vectors and by lexical similarity otherwise.
	pub(crate) async fn retrieve_with_vector(
		&self,
		req: &RetrievalRequest,
		query_vec: Option<&[f32]>,
	) -> Result<Vec<ContextChunk>> {
		let cfg = &self.cfg.retrieval;
		let top_k = req.top_k.unwrap_or(cfg.top_k) as usize;
		let threshold = req.threshold.unwrap_or(cfg.threshold);
		let summary_filter = SummaryFilter { subject: req.subject.clone(), completed_only: true };
		let summaries =
			self.store.recent_summaries(req.student_id, &summary_filter, cfg.summary_limit).await?;
		let turns =
			self.store.recent_turns(req.student_id, &TurnFilter::default(), cfg.turn_limit).await?;
		let mut chunks = Vec::new();

		for summary in &summaries {
			let score = self.score(
				&req.query,
				query_vec,
				&summary.summary_text,
				summary.embedding.as_deref(),
			);

			if score < threshold {
				continue;
			}

			chunks.push(ContextChunk {
				source: ChunkSource::SessionSummary,
				text: summary.summary_text.clone(),
				similarity: score,
				metadata: json!({
					"session_id": summary.session_id,
					"subject": summary.subject,
					"topics": summary.topics,
				}),
			});
		}

		let pairs = pair_turns(&turns);
		let start = pairs.len().saturating_sub(cfg.pair_window as usize);

		for pair in &pairs[start..] {
			let text =
				format!("Student: {}\nCompanion: {}", pair.student.text, pair.companion.text);
			let score = self.score(&req.query, query_vec, &text, pair.student.embedding.as_deref());

			if score < threshold {
				continue;
			}

			chunks.push(ContextChunk {
				source: ChunkSource::Conversation,
				text,
				similarity: score,
				metadata: json!({
					"turn_id": pair.student.turn_id,
					"subject": pair.student.subject,
				}),
			});
		}

		chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
		chunks.truncate(top_k);

		Ok(chunks)
	}

	fn score(
		&self,
		query: &str,
		query_vec: Option<&[f32]>,
		text: &str,
		stored: Option<&[f32]>,
	) -> f32 {
		match (query_vec, stored) {
			(Some(query_vec), Some(stored)) if query_vec.len() == stored.len() =>
				similarity::cosine_similarity(query_vec, stored),
			_ => similarity::lexical_similarity(query, text, self.cfg.retrieval.jaccard_weight),
		}
	}
}

fn validate_request(req: &RetrievalRequest) -> Result<()> {
	if req.query.trim().is_empty() {
		return Err(Error::invalid("query must be non-empty."));
	}
	if req.top_k == Some(0) {
		return Err(Error::invalid("top_k must be greater than zero."));
	}
	if let Some(threshold) = req.threshold
		&& !threshold.is_finite()
	{
		return Err(Error::invalid("threshold must be a finite number."));
	}

	Ok(())
}

/// Student turns immediately answered by a companion turn, oldest first.
fn pair_turns(turns: &[ConversationTurn]) -> Vec<TurnPair<'_>> {
	turns
		.windows(2)
		.filter(|window| window[0].role == Role::Student && window[1].role == Role::Companion)
		.map(|window| TurnPair { student: &window[0], companion: &window[1] })
		.collect()
}
