//! Process-local [`Store`] used by tests and by deployments without Postgres.

use std::{
	collections::HashMap,
	future,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result, Store,
	models::{
		ConversationTurn, EscalationEvent, PracticeProblem, SessionSummary, SummaryFilter,
		TurnFilter, UnderstandingSnapshot,
	},
};

#[derive(Default)]
struct Tables {
	turns: Vec<ConversationTurn>,
	summaries: Vec<SessionSummary>,
	snapshots: Vec<UnderstandingSnapshot>,
	problems: HashMap<Uuid, PracticeProblem>,
	escalations: Vec<EscalationEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
	tables: Mutex<Tables>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn tables(&self) -> MutexGuard<'_, Tables> {
		self.tables.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn ordered_snapshots(&self, student_id: Uuid, subject: &str) -> Vec<UnderstandingSnapshot> {
		let mut out: Vec<_> = self
			.tables()
			.snapshots
			.iter()
			.filter(|snapshot| snapshot.student_id == student_id && snapshot.subject == subject)
			.cloned()
			.collect();

		out.sort_by(|a, b| {
			a.session_date.cmp(&b.session_date).then_with(|| a.created_at.cmp(&b.created_at))
		});

		out
	}
}
impl Store for MemoryStore {
	fn save_turn<'a>(&'a self, turn: &'a ConversationTurn) -> BoxFuture<'a, Result<()>> {
		let mut tables = self.tables();
		let result = if tables.turns.iter().any(|existing| existing.turn_id == turn.turn_id) {
			Err(Error::Conflict(format!("Turn {} already exists.", turn.turn_id)))
		} else {
			tables.turns.push(turn.clone());

			Ok(())
		};

		Box::pin(future::ready(result))
	}

	fn recent_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationTurn>>> {
		let tables = self.tables();
		let matching: Vec<_> = tables
			.turns
			.iter()
			.filter(|turn| turn.student_id == student_id && filter.matches(turn))
			.collect();
		let start = matching.len().saturating_sub(limit as usize);
		let out = matching[start..].iter().map(|turn| (*turn).clone()).collect();

		Box::pin(future::ready(Ok(out)))
	}

	fn get_turn(
		&self,
		student_id: Uuid,
		turn_id: Uuid,
	) -> BoxFuture<'_, Result<Option<ConversationTurn>>> {
		let turn = self
			.tables()
			.turns
			.iter()
			.find(|turn| turn.turn_id == turn_id && turn.student_id == student_id)
			.cloned();

		Box::pin(future::ready(Ok(turn)))
	}

	fn count_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
	) -> BoxFuture<'a, Result<u64>> {
		let count = self
			.tables()
			.turns
			.iter()
			.filter(|turn| turn.student_id == student_id && filter.matches(turn))
			.count() as u64;

		Box::pin(future::ready(Ok(count)))
	}

	fn save_summary<'a>(&'a self, summary: &'a SessionSummary) -> BoxFuture<'a, Result<()>> {
		let mut tables = self.tables();

		tables.summaries.retain(|existing| existing.session_id != summary.session_id);
		tables.summaries.push(summary.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn recent_summaries<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a SummaryFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<SessionSummary>>> {
		let mut out: Vec<_> = self
			.tables()
			.summaries
			.iter()
			.filter(|summary| summary.student_id == student_id && filter.matches(summary))
			.cloned()
			.collect();

		out.sort_by(|a, b| b.session_date.cmp(&a.session_date));
		out.truncate(limit as usize);

		Box::pin(future::ready(Ok(out)))
	}

	fn save_snapshot<'a>(
		&'a self,
		snapshot: &'a UnderstandingSnapshot,
	) -> BoxFuture<'a, Result<()>> {
		self.tables().snapshots.push(snapshot.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn latest_snapshot<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Option<UnderstandingSnapshot>>> {
		let latest = self.ordered_snapshots(student_id, subject).pop();

		Box::pin(future::ready(Ok(latest)))
	}

	fn snapshots<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Vec<UnderstandingSnapshot>>> {
		Box::pin(future::ready(Ok(self.ordered_snapshots(student_id, subject))))
	}

	fn save_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>> {
		self.tables().problems.insert(problem.problem_id, problem.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn get_problem(&self, problem_id: Uuid) -> BoxFuture<'_, Result<Option<PracticeProblem>>> {
		let problem = self.tables().problems.get(&problem_id).cloned();

		Box::pin(future::ready(Ok(problem)))
	}

	fn update_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>> {
		let mut tables = self.tables();
		let result = match tables.problems.get_mut(&problem.problem_id) {
			Some(existing) => {
				*existing = problem.clone();

				Ok(())
			},
			None => Err(Error::NotFound(format!("Practice problem {}.", problem.problem_id))),
		};

		Box::pin(future::ready(result))
	}

	fn count_completed_problems<'a>(
		&'a self,
		student_id: Uuid,
		subject: Option<&'a str>,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, Result<u64>> {
		let count = self
			.tables()
			.problems
			.values()
			.filter(|problem| problem.student_id == student_id)
			.filter(|problem| subject.map(|subject| problem.subject == subject).unwrap_or(true))
			.filter(|problem| match (problem.completed_at, since) {
				(Some(completed_at), Some(since)) => completed_at > since,
				(Some(_), None) => true,
				(None, _) => false,
			})
			.count() as u64;

		Box::pin(future::ready(Ok(count)))
	}

	fn insert_escalation<'a>(
		&'a self,
		event: &'a EscalationEvent,
	) -> BoxFuture<'a, Result<EscalationEvent>> {
		let mut tables = self.tables();
		let existing = tables
			.escalations
			.iter()
			.find(|existing| {
				existing.student_id == event.student_id
					&& existing.triggering_turn_id == event.triggering_turn_id
			})
			.cloned();
		let stored = match existing {
			Some(existing) => existing,
			None => {
				tables.escalations.push(event.clone());

				event.clone()
			},
		};

		Box::pin(future::ready(Ok(stored)))
	}

	fn resolve_escalation(
		&self,
		event_id: Uuid,
		resolved_at: OffsetDateTime,
	) -> BoxFuture<'_, Result<EscalationEvent>> {
		let mut tables = self.tables();
		let result =
			match tables.escalations.iter_mut().find(|event| event.event_id == event_id) {
				Some(event) => {
					if !event.resolved {
						event.resolved = true;
						event.resolved_at = Some(resolved_at);
					}

					Ok(event.clone())
				},
				None => Err(Error::NotFound(format!("Escalation event {event_id}."))),
			};

		Box::pin(future::ready(result))
	}

	fn escalations(
		&self,
		student_id: Uuid,
		include_resolved: bool,
	) -> BoxFuture<'_, Result<Vec<EscalationEvent>>> {
		let mut out: Vec<_> = self
			.tables()
			.escalations
			.iter()
			.filter(|event| event.student_id == student_id && (include_resolved || !event.resolved))
			.cloned()
			.collect();

		out.sort_by(|a, b| a.created_at.cmp(&b.created_at));

		Box::pin(future::ready(Ok(out)))
	}
}
