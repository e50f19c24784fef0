use std::{future::Future, pin::Pin};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{
		ConversationTurn, EscalationEvent, PracticeProblem, SessionSummary, SummaryFilter,
		TurnFilter, UnderstandingSnapshot,
	},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence the pipeline reads and appends to.
///
/// List methods return rows oldest first unless stated otherwise.
pub trait Store
where
	Self: Send + Sync,
{
	fn save_turn<'a>(&'a self, turn: &'a ConversationTurn) -> BoxFuture<'a, Result<()>>;

	/// The newest `limit` turns matching `filter`, returned oldest first.
	fn recent_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationTurn>>>;

	/// `None` when the turn does not exist or belongs to another student.
	fn get_turn(
		&self,
		student_id: Uuid,
		turn_id: Uuid,
	) -> BoxFuture<'_, Result<Option<ConversationTurn>>>;

	fn count_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
	) -> BoxFuture<'a, Result<u64>>;

	/// Inserts or replaces the summary for `summary.session_id`.
	fn save_summary<'a>(&'a self, summary: &'a SessionSummary) -> BoxFuture<'a, Result<()>>;

	/// Newest session first.
	fn recent_summaries<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a SummaryFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<SessionSummary>>>;

	fn save_snapshot<'a>(&'a self, snapshot: &'a UnderstandingSnapshot)
	-> BoxFuture<'a, Result<()>>;

	fn latest_snapshot<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Option<UnderstandingSnapshot>>>;

	/// Full snapshot history for a subject, ordered by session date.
	fn snapshots<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Vec<UnderstandingSnapshot>>>;

	fn save_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>>;

	fn get_problem(&self, problem_id: Uuid) -> BoxFuture<'_, Result<Option<PracticeProblem>>>;

	/// Fails with `NotFound` when the problem was never saved.
	fn update_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>>;

	fn count_completed_problems<'a>(
		&'a self,
		student_id: Uuid,
		subject: Option<&'a str>,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, Result<u64>>;

	/// Idempotent per `(student_id, triggering_turn_id)`: a second insert returns the stored
	/// event.
	fn insert_escalation<'a>(
		&'a self,
		event: &'a EscalationEvent,
	) -> BoxFuture<'a, Result<EscalationEvent>>;

	fn resolve_escalation(
		&self,
		event_id: Uuid,
		resolved_at: OffsetDateTime,
	) -> BoxFuture<'_, Result<EscalationEvent>>;

	fn escalations(
		&self,
		student_id: Uuid,
		include_resolved: bool,
	) -> BoxFuture<'_, Result<Vec<EscalationEvent>>>;
}
