use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, MentorService, Result, Structured, prompts};
use mentor_domain::routing::{RoutingDecision, TriggerContext, TriggerSet};
use mentor_providers::llm::{ChatMessage, CompletionRequest};
use mentor_storage::models::{EscalationEvent, Role, TurnFilter};

const CLASSIFIER_TRIGGER: &str = "llm_classifier";

#[derive(Clone, Debug, Deserialize)]
pub struct EscalationCheckRequest {
	pub student_id: Uuid,
	pub message: String,
	pub subject: Option<String>,
	pub practice_problem_id: Option<Uuid>,
	/// Events are only recorded against a triggering turn.
	pub triggering_turn_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EscalationCheckResponse {
	pub decision: RoutingDecision,
	pub event: Option<EscalationEvent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResolveEscalationRequest {
	pub event_id: Uuid,
}

/// Everything the escalation phases read from storage for one check.
#[derive(Clone, Debug, Default)]
pub(crate) struct RoutingInputs {
	/// Earlier student messages in scope, oldest first.
	pub(crate) recent_student_messages: Vec<String>,
	pub(crate) has_active_problem: bool,
	pub(crate) turns_on_problem: u32,
	pub(crate) problem_attempts: u32,
	pub(crate) understanding_improved: bool,
	pub(crate) mastery: Option<f32>,
}
impl RoutingInputs {
	pub(crate) fn trigger_context<'a>(&'a self, message: &'a str) -> TriggerContext<'a> {
		TriggerContext {
			message,
			recent_student_messages: &self.recent_student_messages,
			has_active_problem: self.has_active_problem,
			turns_on_problem: self.turns_on_problem,
			problem_attempts: self.problem_attempts,
			understanding_improved: self.understanding_improved,
		}
	}
}

impl MentorService {
	pub async fn check_escalation(
		&self,
		req: EscalationCheckRequest,
	) -> Result<EscalationCheckResponse> {
		self.validate_message(&req.message)?;

		if let Some(turn_id) = req.triggering_turn_id
			&& self.store.get_turn(req.student_id, turn_id).await?.is_none()
		{
			return Err(Error::NotFound {
				message: format!("Turn {turn_id} does not exist for student {}.", req.student_id),
			});
		}

		let subject = crate::non_empty(req.subject.as_deref());
		let inputs = self
			.routing_inputs(
				req.student_id,
				subject,
				req.practice_problem_id,
				req.triggering_turn_id,
			)
			.await?;
		let decision = self.decide_routing(req.student_id, &req.message, &inputs).await;
		let event = match req.triggering_turn_id {
			Some(turn_id) => self.record_escalation(req.student_id, turn_id, &decision).await?,
			None => None,
		};

		Ok(EscalationCheckResponse { decision, event })
	}

	pub async fn resolve_escalation(
		&self,
		req: ResolveEscalationRequest,
	) -> Result<EscalationEvent> {
		let event = self.store.resolve_escalation(req.event_id, crate::now()).await?;

		tracing::info!(
			event_id = %event.event_id,
			student_id = %event.student_id,
			"Escalation resolved."
		);

		Ok(event)
	}

	/// `current_turn` is excluded from the earlier messages; the current message always counts
	/// as one turn on the problem.
	pub(crate) async fn routing_inputs(
		&self,
		student_id: Uuid,
		subject: Option<&str>,
		practice_problem_id: Option<Uuid>,
		current_turn: Option<Uuid>,
	) -> Result<RoutingInputs> {
		let cfg = &self.cfg.escalation;
		let limit = cfg.classifier_turns.max(cfg.frustration_window) + 1;
		let filter = TurnFilter {
			subject: if practice_problem_id.is_some() { None } else { subject.map(str::to_string) },
			practice_problem_id,
			role: Some(Role::Student),
			since: None,
		};
		let recent = self.store.recent_turns(student_id, &filter, limit).await?;
		let current_stored = current_turn
			.map(|turn_id| recent.iter().any(|turn| turn.turn_id == turn_id))
			.unwrap_or(false);
		let mut inputs = RoutingInputs {
			recent_student_messages: recent
				.into_iter()
				.filter(|turn| Some(turn.turn_id) != current_turn)
				.map(|turn| turn.text)
				.collect(),
			..Default::default()
		};
		let mut subject = subject.map(str::to_string);

		if let Some(problem_id) = practice_problem_id
			&& let Some(problem) = self.store.get_problem(problem_id).await?
			&& problem.student_id == student_id
		{
			let stored = self.store.count_turns(student_id, &filter).await?;
			let stored = u32::try_from(stored).unwrap_or(u32::MAX);

			inputs.has_active_problem = problem.completed_at.is_none();
			inputs.problem_attempts = u32::try_from(problem.attempts_count).unwrap_or(0);
			inputs.turns_on_problem =
				stored.saturating_sub(u32::from(current_stored)).saturating_add(1);

			subject.get_or_insert(problem.subject);
		}

		if let Some(subject) = subject.as_deref() {
			let snapshots = self.store.snapshots(student_id, subject).await?;

			inputs.mastery = snapshots.last().map(|snapshot| snapshot.level);
			inputs.understanding_improved = match snapshots.as_slice() {
				[.., previous, latest] => latest.level > previous.level,
				_ => false,
			};
		}

		Ok(inputs)
	}

	/// Deterministic triggers first; the classifier only runs when none fired with enough
	/// confidence.
	pub(crate) async fn decide_routing(
		&self,
		student_id: Uuid,
		message: &str,
		inputs: &RoutingInputs,
	) -> RoutingDecision {
		match self.deterministic_routing(message, inputs) {
			Some(decision) => decision,
			None => self.classify_routing(student_id, message, inputs).await,
		}
	}

	pub(crate) fn deterministic_routing(
		&self,
		message: &str,
		inputs: &RoutingInputs,
	) -> Option<RoutingDecision> {
		let cfg = &self.cfg.escalation;

		TriggerSet::from_config(cfg)
			.evaluate(&inputs.trigger_context(message))
			.map(|decision| decision.normalized(cfg.high_urgency_confidence))
	}

	/// Classifier failures, timeouts and malformed output all resolve to "no escalation".
	pub(crate) async fn classify_routing(
		&self,
		student_id: Uuid,
		message: &str,
		inputs: &RoutingInputs,
	) -> RoutingDecision {
		self.classify(student_id, message, inputs)
			.await
			.normalized(self.cfg.escalation.high_urgency_confidence)
	}

	/// Creates at most one event per triggering turn, and only for confident decisions.
	pub(crate) async fn record_escalation(
		&self,
		student_id: Uuid,
		triggering_turn_id: Uuid,
		decision: &RoutingDecision,
	) -> Result<Option<EscalationEvent>> {
		if !decision.routing_needed || decision.confidence < self.cfg.escalation.event_confidence {
			return Ok(None);
		}

		let event = EscalationEvent {
			event_id: Uuid::new_v4(),
			student_id,
			triggering_turn_id,
			reason: decision.reason.clone(),
			confidence: decision.confidence,
			urgency: decision.urgency.as_str().to_string(),
			triggers: decision.triggers.clone(),
			resolved: false,
			created_at: crate::now(),
			resolved_at: None,
		};
		let stored = self.store.insert_escalation(&event).await?;

		tracing::info!(
			event_id = %stored.event_id,
			student_id = %student_id,
			urgency = %stored.urgency,
			confidence = stored.confidence,
			"Escalation recorded."
		);

		Ok(Some(stored))
	}

	pub(crate) fn validate_message(&self, message: &str) -> Result<()> {
		if message.trim().is_empty() {
			return Err(Error::invalid("message must be non-empty."));
		}

		let max = self.cfg.chat.max_message_chars as usize;

		if message.chars().count() > max {
			return Err(Error::invalid(format!("message must be at most {max} characters.")));
		}

		Ok(())
	}

	async fn classify(
		&self,
		student_id: Uuid,
		message: &str,
		inputs: &RoutingInputs,
	) -> RoutingDecision {
		let cfg = &self.cfg.escalation;
		let keep = cfg.classifier_turns.saturating_sub(1) as usize;
		let earlier = &inputs.recent_student_messages;
		let mut transcript = earlier[earlier.len().saturating_sub(keep)..].to_vec();

		transcript.push(message.to_string());

		let req = CompletionRequest {
			messages: vec![
				ChatMessage::system(prompts::CLASSIFIER),
				ChatMessage::user(prompts::classifier_user(
					&transcript,
					inputs.mastery,
					inputs.problem_attempts,
				)),
			],
			temperature: Some(0.0),
			..Default::default()
		};
		let timeout = Duration::from_millis(cfg.classifier_timeout_ms);
		let outcome = tokio::time::timeout(
			timeout,
			self.complete_structured::<RoutingDecision>(&req, "escalation_classifier", student_id),
		)
		.await;

		match outcome {
			Ok(Ok(Structured::Parsed(mut decision))) => {
				if decision.routing_needed && decision.triggers.is_empty() {
					decision.triggers.push(CLASSIFIER_TRIGGER.to_string());
				}

				decision
			},
			Ok(Ok(Structured::Raw(_))) => RoutingDecision::none("Classifier output was malformed."),
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Escalation classifier failed.");

				RoutingDecision::none("Classifier unavailable.")
			},
			Err(_) => {
				tracing::warn!(
					timeout_ms = cfg.classifier_timeout_ms,
					"Escalation classifier timed out."
				);

				RoutingDecision::none("Classifier timed out.")
			},
		}
	}
}
