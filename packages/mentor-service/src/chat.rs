use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
	Error, MentorService, Result, RetrievalRequest, StudyNote,
	escalation::RoutingInputs,
	prompts::{self, CompanionPrompt, ProblemState},
};
use mentor_domain::{
	repeat,
	routing::{self, RoutingDecision, Urgency},
	shaping::{self, ShapeOptions},
	signals,
};
use mentor_providers::llm::{ChatMessage, CompletionRequest, ImageInput};
use mentor_storage::models::{ConversationTurn, PracticeProblem, Role, TurnFilter};

const MAX_NOTE_CONCEPT_CHARS: usize = 80;

#[derive(Clone, Debug, Deserialize)]
pub struct StudentRef {
	pub student_id: Uuid,
	pub name: Option<String>,
	pub grade_level: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatContext {
	pub subject: Option<String>,
	pub practice_problem_id: Option<Uuid>,
	pub session_id: Option<Uuid>,
	#[serde(default)]
	pub homework_help: bool,
}

/// An image shared with the message, either inline base64 `data` or a fetchable `url`.
#[derive(Clone, Debug, Deserialize)]
pub struct Attachment {
	pub media_type: String,
	pub data: Option<String>,
	pub url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatTurnRequest {
	pub student: StudentRef,
	pub message: String,
	#[serde(default)]
	pub context: ChatContext,
	#[serde(default)]
	pub attachments: Vec<Attachment>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
	General,
	HomeworkHelp,
}
impl ChatMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::General => "general",
			Self::HomeworkHelp => "homework_help",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EscalationNotice {
	pub urgency: Urgency,
	pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatTurnResponse {
	pub reply_text: String,
	/// The companion turn.
	pub turn_id: Uuid,
	pub student_turn_id: Uuid,
	pub mode: ChatMode,
	pub escalation: Option<EscalationNotice>,
}

struct Generated {
	text: String,
	model: Option<String>,
}

impl MentorService {
	/// Runs one chat turn end to end. Provider failures never surface as errors; the student
	/// always gets a reply.
	pub async fn handle_chat_turn(&self, req: ChatTurnRequest) -> Result<ChatTurnResponse> {
		self.validate_chat(&req)?;

		let student_id = req.student.student_id;
		let _guard = self.lock_student(student_id).await;
		let context = &req.context;
		let subject = crate::non_empty(context.subject.as_deref());
		let mode = if context.homework_help || !req.attachments.is_empty() {
			ChatMode::HomeworkHelp
		} else {
			ChatMode::General
		};
		let repeat_count = self.repeat_count(student_id, &req.message, subject, context).await?;

		if repeat_count >= self.cfg.chat.repeat_threshold as usize {
			return self.acknowledge_repeat(&req, mode, repeat_count).await;
		}

		let embedding = self.embed_text(&req.message).await;
		let student_turn =
			self.turn(&req, Role::Student, req.message.clone(), embedding, json!({}));

		self.store.save_turn(&student_turn).await?;

		let retrieval_req = RetrievalRequest {
			student_id,
			query: req.message.clone(),
			top_k: None,
			threshold: None,
			subject: subject.map(str::to_string),
		};
		let (chunks, inputs) = tokio::join!(
			self.retrieve_with_vector(&retrieval_req, student_turn.embedding.as_deref()),
			self.routing_inputs(
				student_id,
				subject,
				context.practice_problem_id,
				Some(student_turn.turn_id),
			),
		);
		let chunks = chunks.unwrap_or_else(|err| {
			tracing::warn!(error = %err, student_id = %student_id, "Retrieval failed.");

			Vec::new()
		});
		let inputs = inputs.unwrap_or_else(|err| {
			tracing::warn!(
				error = %err,
				student_id = %student_id,
				"Failed to load routing inputs."
			);

			RoutingInputs::default()
		});
		let deterministic = self.deterministic_routing(&req.message, &inputs);
		let mastery = match subject {
			Some(subject) => self.mastery_context(student_id, subject).await.unwrap_or_else(|err| {
				tracing::warn!(error = %err, "Failed to load mastery context.");

				None
			}),
			None => None,
		};
		let problem = match context.practice_problem_id {
			Some(problem_id) => self.store.get_problem(problem_id).await.ok().flatten(),
			None => None,
		};
		let history = self.history(student_id, subject, context, student_turn.turn_id).await;
		let system = prompts::companion_system(&CompanionPrompt {
			homework_help: mode == ChatMode::HomeworkHelp,
			student_name: crate::non_empty(req.student.name.as_deref()),
			grade_level: crate::non_empty(req.student.grade_level.as_deref()),
			subject,
			mastery: mastery.as_ref(),
			chunks: &chunks,
			problem: problem.as_ref().map(problem_state).as_ref(),
		});
		let generated = self.generate_reply(&req, mode, system, history).await;
		let misconceptions: Vec<String> = signals::detect_struggle(
			inputs
				.recent_student_messages
				.iter()
				.map(String::as_str)
				.chain(std::iter::once(req.message.as_str())),
		)
		.map(|signal| vec![signal.concept])
		.unwrap_or_default();
		let companion_turn = self.turn(
			&req,
			Role::Companion,
			generated.text.clone(),
			None,
			json!({
				"misconceptions": misconceptions,
				"model": generated.model,
				"mode": mode.as_str(),
			}),
		);

		self.store.save_turn(&companion_turn).await?;

		let decision = match deterministic {
			Some(decision) => decision,
			None => self.classify_routing(student_id, &req.message, &inputs).await,
		};

		if let Err(err) =
			self.record_escalation(student_id, student_turn.turn_id, &decision).await
		{
			tracing::warn!(error = %err, student_id = %student_id, "Failed to record escalation.");
		}

		let escalation = match mode {
			ChatMode::General => self.escalation_notice(&decision),
			ChatMode::HomeworkHelp => {
				self.note_homework_escalation(&req, &decision, &inputs, misconceptions.first())
					.await;

				None
			},
		};

		self.track_event(
			"chat_turn",
			student_id,
			json!({
				"mode": mode.as_str(),
				"subject": subject,
				"context_chunks": chunks.len(),
				"generation_failed": generated.model.is_none(),
				"routing_needed": decision.routing_needed,
				"escalation_shown": escalation.is_some(),
			}),
		)
		.await;

		Ok(ChatTurnResponse {
			reply_text: generated.text,
			turn_id: companion_turn.turn_id,
			student_turn_id: student_turn.turn_id,
			mode,
			escalation,
		})
	}

	fn validate_chat(&self, req: &ChatTurnRequest) -> Result<()> {
		self.validate_message(&req.message)?;

		let max = self.cfg.chat.max_attachments as usize;

		if req.attachments.len() > max {
			return Err(Error::invalid(format!("At most {max} attachments are allowed.")));
		}

		for (idx, attachment) in req.attachments.iter().enumerate() {
			if !attachment.media_type.starts_with("image/") {
				return Err(Error::invalid(format!(
					"attachments[{idx}].media_type must be an image type."
				)));
			}

			let has_data = crate::non_empty(attachment.data.as_deref()).is_some();
			let has_url = crate::non_empty(attachment.url.as_deref()).is_some();

			if has_data == has_url {
				return Err(Error::invalid(format!(
					"attachments[{idx}] must carry exactly one of data or url."
				)));
			}
		}

		Ok(())
	}

	/// Times this message has been asked among recent student turns in the same scope,
	/// counting the current one.
	async fn repeat_count(
		&self,
		student_id: Uuid,
		message: &str,
		subject: Option<&str>,
		context: &ChatContext,
	) -> Result<usize> {
		let filter = TurnFilter {
			subject: if context.practice_problem_id.is_some() {
				None
			} else {
				subject.map(str::to_string)
			},
			practice_problem_id: context.practice_problem_id,
			role: Some(Role::Student),
			since: None,
		};
		let recent =
			self.store.recent_turns(student_id, &filter, self.cfg.chat.repeat_window).await?;

		Ok(repeat::count_repeats(message, recent.iter().map(|turn| turn.text.as_str())))
	}

	async fn acknowledge_repeat(
		&self,
		req: &ChatTurnRequest,
		mode: ChatMode,
		repeat_count: usize,
	) -> Result<ChatTurnResponse> {
		let student_id = req.student.student_id;
		let student_turn = self.turn(req, Role::Student, req.message.clone(), None, json!({}));

		self.store.save_turn(&student_turn).await?;

		let companion_turn = self.turn(
			req,
			Role::Companion,
			prompts::REPEAT_ACKNOWLEDGEMENT.to_string(),
			None,
			json!({ "repeated_query": true, "repeat_count": repeat_count, "mode": mode.as_str() }),
		);

		self.store.save_turn(&companion_turn).await?;

		tracing::info!(student_id = %student_id, repeat_count, "Repeated query acknowledged.");

		self.write_study_note(StudyNote {
			student_id,
			subject: req.context.subject.clone(),
			concept: note_concept(None, &req.message),
			message: format!(
				"Student asked the same question {repeat_count} times: \"{}\"",
				req.message.trim()
			),
			created_at: crate::now(),
		})
		.await;
		self.track_event(
			"repeated_query",
			student_id,
			json!({ "mode": mode.as_str(), "repeat_count": repeat_count }),
		)
		.await;

		Ok(ChatTurnResponse {
			reply_text: prompts::REPEAT_ACKNOWLEDGEMENT.to_string(),
			turn_id: companion_turn.turn_id,
			student_turn_id: student_turn.turn_id,
			mode,
			escalation: None,
		})
	}

	/// Earlier turns in scope, oldest first, as chat messages.
	async fn history(
		&self,
		student_id: Uuid,
		subject: Option<&str>,
		context: &ChatContext,
		current_turn: Uuid,
	) -> Vec<ChatMessage> {
		let filter = TurnFilter {
			subject: if context.practice_problem_id.is_some() {
				None
			} else {
				subject.map(str::to_string)
			},
			practice_problem_id: context.practice_problem_id,
			..Default::default()
		};
		let turns = match self
			.store
			.recent_turns(student_id, &filter, self.cfg.chat.history_turns + 1)
			.await
		{
			Ok(turns) => turns,
			Err(err) => {
				tracing::warn!(error = %err, "Failed to load conversation history.");

				return Vec::new();
			},
		};

		turns
			.into_iter()
			.filter(|turn| turn.turn_id != current_turn)
			.map(|turn| match turn.role {
				Role::Student => ChatMessage::user(turn.text),
				Role::Companion => ChatMessage::assistant(turn.text),
			})
			.collect()
	}

	async fn generate_reply(
		&self,
		req: &ChatTurnRequest,
		mode: ChatMode,
		system: String,
		history: Vec<ChatMessage>,
	) -> Generated {
		let mut messages = Vec::with_capacity(history.len() + 2);

		messages.push(ChatMessage::system(system));
		messages.extend(history);
		messages.push(ChatMessage::user(req.message.clone()));

		let images = match mode {
			ChatMode::HomeworkHelp => req.attachments.iter().filter_map(image_input).collect(),
			ChatMode::General => Vec::new(),
		};
		let completion_req = CompletionRequest { messages, images, ..Default::default() };

		match self.complete(&completion_req, "chat_turn", req.student.student_id).await {
			Ok(completion) => {
				let options = ShapeOptions {
					max_sentences: self.cfg.chat.max_sentences as usize,
					min_sentences: self.cfg.chat.min_sentences as usize,
					strip_tutor_suggestions: mode == ChatMode::HomeworkHelp,
				};

				Generated {
					text: shaping::shape_reply(&completion.text, options),
					model: Some(completion.model),
				}
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					student_id = %req.student.student_id,
					"All completion vendors failed. Replying with an apology."
				);

				Generated { text: prompts::APOLOGY.to_string(), model: None }
			},
		}
	}

	fn escalation_notice(&self, decision: &RoutingDecision) -> Option<EscalationNotice> {
		if !decision.routing_needed
			|| decision.confidence < self.cfg.escalation.short_circuit_confidence
		{
			return None;
		}

		Some(EscalationNotice { urgency: decision.urgency, reason: decision.reason.clone() })
	}

	/// Homework help never shows escalation to the student; the tutor gets a study note instead.
	async fn note_homework_escalation(
		&self,
		req: &ChatTurnRequest,
		decision: &RoutingDecision,
		inputs: &RoutingInputs,
		misconception: Option<&String>,
	) {
		let explicit = decision.is_explicit_request() || routing::is_explicit_request(&req.message);
		let long_thread = inputs.turns_on_problem >= self.cfg.chat.homework_note_turns;

		if !explicit && !long_thread {
			return;
		}

		let message = if explicit {
			"Student asked for a human tutor during homework help.".to_string()
		} else {
			format!(
				"Student has spent {} turns on the same homework problem. {}",
				inputs.turns_on_problem, decision.reason
			)
		};

		self.write_study_note(StudyNote {
			student_id: req.student.student_id,
			subject: req.context.subject.clone(),
			concept: note_concept(misconception.map(String::as_str), &req.message),
			message,
			created_at: crate::now(),
		})
		.await;
	}

	fn turn(
		&self,
		req: &ChatTurnRequest,
		role: Role,
		text: String,
		embedding: Option<Vec<f32>>,
		metadata: serde_json::Value,
	) -> ConversationTurn {
		ConversationTurn {
			turn_id: Uuid::new_v4(),
			student_id: req.student.student_id,
			role,
			text,
			subject: crate::non_empty(req.context.subject.as_deref()).map(str::to_string),
			practice_problem_id: req.context.practice_problem_id,
			session_id: req.context.session_id,
			metadata,
			embedding,
			created_at: crate::now(),
		}
	}
}

fn problem_state(problem: &PracticeProblem) -> ProblemState<'_> {
	ProblemState {
		prompt: &problem.prompt,
		attempts: problem.attempts_count,
		last_answer: problem.student_answer.as_deref(),
	}
}

fn image_input(attachment: &Attachment) -> Option<ImageInput> {
	if let Some(url) = crate::non_empty(attachment.url.as_deref()) {
		return Some(ImageInput { url: url.to_string() });
	}

	crate::non_empty(attachment.data.as_deref())
		.map(|data| ImageInput::from_base64(&attachment.media_type, data))
}

fn note_concept(misconception: Option<&str>, message: &str) -> String {
	if let Some(concept) = misconception {
		return concept.to_string();
	}

	let concept = signals::detect_struggle(std::iter::once(message))
		.map(|signal| signal.concept)
		.unwrap_or_else(|| message.trim().to_string());

	concept.chars().take(MAX_NOTE_CONCEPT_CHARS).collect()
}
