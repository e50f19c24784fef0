use mentor_domain::{routing::Urgency, shaping};
use mentor_service::{Attachment, ChatContext, ChatMode, Error};
use mentor_storage::{
	Store,
	models::{Role, TurnFilter},
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NO_ROUTING, chat_request, failing_llm, harness, metadata_model, subject_context, turn};

const LONG_REPLY: &str = "Great effort so far. Let's look at the equation again. First subtract three \
from both sides. Then divide by two. That gives the value of x.";
const ACKNOWLEDGEMENT_PREFIX: &str = "I can see you've asked about this several times";

#[tokio::test]
async fn replies_are_shaped_into_two_to_four_sentences_ending_in_a_question() {
	let h = harness(LONG_REPLY, NO_ROUTING).build();
	let student = Uuid::new_v4();
	let res = h
		.service
		.handle_chat_turn(chat_request(
			student,
			"How do I solve 2x + 3 = 11",
			subject_context("algebra"),
		))
		.await
		.expect("chat turn failed");
	let sentences = shaping::split_sentences(&res.reply_text);

	assert!((2..=4).contains(&sentences.len()), "reply: {}", res.reply_text);
	assert!(res.reply_text.ends_with('?'));
	assert_eq!(res.mode, ChatMode::General);
	assert!(res.escalation.is_none());

	let turns = h
		.store
		.recent_turns(student, &TurnFilter::default(), 10)
		.await
		.expect("Failed to load turns.");

	assert_eq!(turns.len(), 2);
	assert_eq!(turns[0].role, Role::Student);
	assert_eq!(turns[0].turn_id, res.student_turn_id);
	assert!(turns[0].embedding.is_some());
	assert_eq!(turns[1].turn_id, res.turn_id);
	assert_eq!(turns[1].text, res.reply_text);
	assert_eq!(metadata_model(&turns[1]), Some("primary-model"));
	assert!(h.sink.event_names().contains(&"chat_turn".to_string()));
}

#[tokio::test]
async fn tenth_repeated_question_is_acknowledged_without_generation() {
	let h = harness("Let's think about it. What have you tried?", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();
	let asks = [
		"Can you just do my homework for me?",
		"can you just do my homework for me",
		"Can you just do my homework for me??",
		"CAN YOU JUST DO MY HOMEWORK FOR ME",
	];

	for idx in 0..8 {
		let text = asks[idx % asks.len()];

		h.store
			.save_turn(&turn(student, Role::Student, text, Some("math"), now))
			.await
			.expect("Failed to seed turn.");
	}

	let ninth = h
		.service
		.handle_chat_turn(chat_request(student, asks[0], subject_context("math")))
		.await
		.expect("ninth turn failed");

	assert!(!ninth.reply_text.starts_with(ACKNOWLEDGEMENT_PREFIX));

	let llm_calls = h.llm_calls();
	let embed_calls = h.embed_calls();
	let tenth = h
		.service
		.handle_chat_turn(chat_request(student, asks[1], subject_context("math")))
		.await
		.expect("tenth turn failed");

	assert!(tenth.reply_text.starts_with(ACKNOWLEDGEMENT_PREFIX));
	assert!(tenth.reply_text.ends_with('?'));
	assert_eq!(h.llm_calls(), llm_calls);
	assert_eq!(h.embed_calls(), embed_calls);

	let notes = h.sink.notes();

	assert_eq!(notes.len(), 1);
	assert_eq!(notes[0].student_id, student);
	assert_eq!(notes[0].subject.as_deref(), Some("math"));
}

#[tokio::test]
async fn explicit_request_shows_high_urgency_notice_and_skips_classifier() {
	let h =
		harness("I hear you. Let's keep going together. What part is hardest?", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let res = h
		.service
		.handle_chat_turn(chat_request(student, "I want a real tutor", subject_context("biology")))
		.await
		.expect("chat turn failed");
	let notice = res.escalation.expect("expected an escalation notice");

	assert_eq!(notice.urgency, Urgency::High);
	assert_eq!(h.llm_calls(), 1);

	let events = h.store.escalations(student, false).await.expect("Failed to load escalations.");

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].confidence, 1.0);
	assert_eq!(events[0].urgency, "high");
	assert_eq!(events[0].triggering_turn_id, res.student_turn_id);
}

#[tokio::test]
async fn homework_mode_hides_escalation_and_leaves_a_study_note() {
	let reply =
		"You could talk to your tutor about this. Let's look at the first step. What is being asked?";
	let h = harness(reply, NO_ROUTING).build();
	let student = Uuid::new_v4();
	let mut req = chat_request(student, "Can I talk to my tutor about this worksheet", ChatContext {
		subject: Some("chemistry".to_string()),
		..Default::default()
	});

	req.attachments.push(Attachment {
		media_type: "image/jpeg".to_string(),
		data: Some("aGVsbG8=".to_string()),
		url: None,
	});

	let res = h.service.handle_chat_turn(req).await.expect("chat turn failed");

	assert_eq!(res.mode, ChatMode::HomeworkHelp);
	assert!(res.escalation.is_none());
	assert!(!res.reply_text.to_lowercase().contains("tutor"));
	assert!(res.reply_text.ends_with('?'));
	assert_eq!(h.sink.notes().len(), 1);
}

#[tokio::test]
async fn long_homework_threads_leave_a_study_note_without_a_routing_decision() {
	let h = harness("Good progress. What is the next step?", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let problem = super::practice::seed_problem(&h, student, "algebra").await;
	let context = ChatContext {
		subject: Some("algebra".to_string()),
		practice_problem_id: Some(problem.problem_id),
		homework_help: true,
		..Default::default()
	};

	for idx in 1..=9 {
		let message = format!("For part {idx} I moved the constant across first");
		let res = h
			.service
			.handle_chat_turn(chat_request(student, &message, context.clone()))
			.await
			.expect("chat turn failed");

		assert_eq!(res.mode, ChatMode::HomeworkHelp);
		assert!(res.escalation.is_none());

		if idx < 8 {
			assert!(h.sink.notes().is_empty(), "no note expected after {idx} turns");
		}
	}

	let notes = h.sink.notes();

	assert_eq!(notes.len(), 2);
	assert!(notes[0].message.contains("8 turns"));
	assert_eq!(notes[0].subject.as_deref(), Some("algebra"));
	assert!(h.store.escalations(student, true).await.expect("escalations").is_empty());
}

#[tokio::test]
async fn total_generation_failure_still_replies() {
	let h = failing_llm().build();
	let student = Uuid::new_v4();
	let res = h
		.service
		.handle_chat_turn(chat_request(student, "What is a prime number", subject_context("math")))
		.await
		.expect("chat turn failed");

	assert!(res.reply_text.starts_with("I'm sorry"));
	assert!(res.escalation.is_none());

	let turns = h
		.store
		.recent_turns(student, &TurnFilter::default(), 10)
		.await
		.expect("Failed to load turns.");

	assert_eq!(turns.len(), 2);
	assert_eq!(metadata_model(&turns[1]), None);
}

#[tokio::test]
async fn fallback_vendor_answers_when_primary_fails() {
	let h = super::harness_with(|cfg, req| {
		if cfg.provider_id == "primary" {
			return Err(mentor_providers::Error::InvalidResponse {
				message: "overloaded".to_string(),
			});
		}
		if req.json_mode {
			return Ok(NO_ROUTING.to_string());
		}

		Ok("Nice question. What do you already know about primes?".to_string())
	})
	.config(|cfg| cfg.providers.llm_fallback = Some(super::llm_provider("backup")))
	.build();
	let student = Uuid::new_v4();
	let res = h
		.service
		.handle_chat_turn(chat_request(student, "Explain primes", subject_context("math")))
		.await
		.expect("chat turn failed");

	assert!(res.reply_text.ends_with('?'));
	assert!(!res.reply_text.starts_with("I'm sorry"));

	let costs = h.sink.costs.lock().expect("costs lock").clone();

	assert!(!costs.is_empty());
	assert!(costs.iter().all(|cost| cost.provider_id == "backup"));

	let turns = h
		.store
		.recent_turns(student, &TurnFilter::default(), 10)
		.await
		.expect("Failed to load turns.");

	assert_eq!(metadata_model(&turns[1]), Some("backup-model"));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_provider_call() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let blank = h
		.service
		.handle_chat_turn(chat_request(student, "   ", ChatContext::default()))
		.await;

	assert!(matches!(blank, Err(Error::InvalidRequest { .. })));

	let mut pdf = chat_request(student, "see attached", ChatContext::default());

	pdf.attachments.push(Attachment {
		media_type: "application/pdf".to_string(),
		data: Some("JVBERi0=".to_string()),
		url: None,
	});

	assert!(matches!(h.service.handle_chat_turn(pdf).await, Err(Error::InvalidRequest { .. })));
	assert_eq!(h.llm_calls(), 0);
	assert_eq!(h.embed_calls(), 0);
}

#[tokio::test]
async fn repeated_frustration_on_one_problem_routes_with_frustration_cues() {
	let h = harness("Let's slow down. What is the power rule?", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let problem = super::practice::seed_problem(&h, student, "calculus").await;
	let context = ChatContext {
		subject: Some("calculus".to_string()),
		practice_problem_id: Some(problem.problem_id),
		..Default::default()
	};
	let message = "I'm so stuck, I hate this, what's the derivative of x^2?";

	h.service
		.handle_chat_turn(chat_request(student, message, context.clone()))
		.await
		.expect("first turn failed");

	let second = h
		.service
		.handle_chat_turn(chat_request(student, message, context))
		.await
		.expect("second turn failed");
	let events = h.store.escalations(student, true).await.expect("Failed to load escalations.");
	let latest = events
		.iter()
		.find(|event| event.triggering_turn_id == second.student_turn_id)
		.expect("expected an event for the second turn");

	assert!(latest.triggers.contains(&"frustration_cues".to_string()));
	assert!(latest.confidence >= 0.85);
	assert!(second.escalation.is_some());
}
