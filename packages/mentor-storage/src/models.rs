use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};

pub const SUMMARY_COMPLETED: &str = "completed";

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Student,
	Companion,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Student => "student",
			Self::Companion => "companion",
		}
	}

	pub fn parse(raw: &str) -> Result<Self> {
		match raw {
			"student" => Ok(Self::Student),
			"companion" => Ok(Self::Companion),
			other => Err(Error::InvalidArgument(format!("Unknown turn role {other:?}."))),
		}
	}
}

/// One message in a student's conversation. Never modified after it is saved.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConversationTurn {
	pub turn_id: Uuid,
	pub student_id: Uuid,
	pub role: Role,
	pub text: String,
	pub subject: Option<String>,
	pub practice_problem_id: Option<Uuid>,
	pub session_id: Option<Uuid>,
	/// Companion turns record `misconceptions` and `model` here.
	pub metadata: Value,
	#[serde(skip)]
	pub embedding: Option<Vec<f32>>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Default)]
pub struct TurnFilter {
	pub subject: Option<String>,
	pub practice_problem_id: Option<Uuid>,
	pub role: Option<Role>,
	/// Only turns created strictly after this instant.
	pub since: Option<OffsetDateTime>,
}
impl TurnFilter {
	pub fn matches(&self, turn: &ConversationTurn) -> bool {
		if let Some(subject) = &self.subject
			&& turn.subject.as_deref() != Some(subject.as_str())
		{
			return false;
		}
		if let Some(problem_id) = self.practice_problem_id
			&& turn.practice_problem_id != Some(problem_id)
		{
			return false;
		}
		if let Some(role) = self.role
			&& turn.role != role
		{
			return false;
		}
		if let Some(since) = self.since
			&& turn.created_at <= since
		{
			return false;
		}

		true
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, sqlx::FromRow)]
pub struct SessionSummary {
	pub session_id: Uuid,
	pub student_id: Uuid,
	pub subject: String,
	pub topics: Vec<String>,
	pub summary_text: String,
	#[serde(skip)]
	pub embedding: Option<Vec<f32>>,
	pub status: String,
	#[serde(with = "crate::time_serde")]
	pub session_date: OffsetDateTime,
}

#[derive(Clone, Debug, Default)]
pub struct SummaryFilter {
	pub subject: Option<String>,
	pub completed_only: bool,
}
impl SummaryFilter {
	pub fn matches(&self, summary: &SessionSummary) -> bool {
		if self.completed_only && summary.status != SUMMARY_COMPLETED {
			return false;
		}

		self.subject.as_deref().map(|subject| summary.subject == subject).unwrap_or(true)
	}
}

/// Append-only mastery reading for one student and subject.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, sqlx::FromRow)]
pub struct UnderstandingSnapshot {
	pub snapshot_id: Uuid,
	pub student_id: Uuid,
	pub subject: String,
	pub topic: Option<String>,
	pub level: f32,
	pub previous_level: Option<f32>,
	#[serde(with = "crate::time_serde")]
	pub session_date: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, sqlx::FromRow)]
pub struct PracticeProblem {
	pub problem_id: Uuid,
	pub student_id: Uuid,
	pub subject: String,
	pub topic: String,
	pub difficulty: i16,
	pub prompt: String,
	pub correct_answer: String,
	pub solution_steps: Vec<String>,
	pub student_answer: Option<String>,
	pub is_correct: Option<bool>,
	pub feedback: Option<String>,
	pub attempts_count: i32,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub completed_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, sqlx::FromRow)]
pub struct EscalationEvent {
	pub event_id: Uuid,
	pub student_id: Uuid,
	pub triggering_turn_id: Uuid,
	pub reason: String,
	pub confidence: f32,
	pub urgency: String,
	pub triggers: Vec<String>,
	pub resolved: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub resolved_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TurnRow {
	pub(crate) turn_id: Uuid,
	pub(crate) student_id: Uuid,
	pub(crate) role: String,
	pub(crate) text: String,
	pub(crate) subject: Option<String>,
	pub(crate) practice_problem_id: Option<Uuid>,
	pub(crate) session_id: Option<Uuid>,
	pub(crate) metadata: Value,
	pub(crate) embedding: Option<Vec<f32>>,
	pub(crate) created_at: OffsetDateTime,
}
impl TryFrom<TurnRow> for ConversationTurn {
	type Error = Error;

	fn try_from(row: TurnRow) -> Result<Self> {
		Ok(Self {
			turn_id: row.turn_id,
			student_id: row.student_id,
			role: Role::parse(&row.role)?,
			text: row.text,
			subject: row.subject,
			practice_problem_id: row.practice_problem_id,
			session_id: row.session_id,
			metadata: row.metadata,
			embedding: row.embedding,
			created_at: row.created_at,
		})
	}
}
