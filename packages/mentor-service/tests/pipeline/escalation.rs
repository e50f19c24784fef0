use std::time::Duration;

use mentor_domain::routing::Urgency;
use mentor_service::{EscalationCheckRequest, Error, ResolveEscalationRequest};
use mentor_storage::{Store, models::Role};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Harness, NO_ROUTING, NOT_JSON, harness, turn};

fn check(student_id: Uuid, message: &str, turn: Option<Uuid>) -> EscalationCheckRequest {
	EscalationCheckRequest {
		student_id,
		message: message.to_string(),
		subject: Some("math".to_string()),
		practice_problem_id: None,
		triggering_turn_id: turn,
	}
}

async fn seed_turn(h: &Harness, student_id: Uuid, message: &str) -> Uuid {
	let stored = turn(student_id, Role::Student, message, Some("math"), OffsetDateTime::now_utc());

	h.store.save_turn(&stored).await.expect("Failed to seed turn.");

	stored.turn_id
}

#[tokio::test]
async fn explicit_request_is_certain_and_high_urgency() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let turn = seed_turn(&h, student, "I want a real tutor").await;
	let res = h
		.service
		.check_escalation(check(student, "I want a real tutor", Some(turn)))
		.await
		.expect("check failed");

	assert!(res.decision.routing_needed);
	assert_eq!(res.decision.confidence, 1.0);
	assert_eq!(res.decision.urgency, Urgency::High);
	assert_eq!(h.llm_calls(), 0);

	let event = res.event.expect("expected an escalation event");
	let again = h
		.service
		.check_escalation(check(student, "I want a real tutor", Some(turn)))
		.await
		.expect("second check failed");

	assert_eq!(again.event.map(|event| event.event_id), Some(event.event_id));
	assert_eq!(h.store.escalations(student, true).await.expect("escalations").len(), 1);
}

#[tokio::test]
async fn malformed_classifier_output_means_no_escalation() {
	let h = harness("unused", NOT_JSON).build();
	let student = Uuid::new_v4();
	let turn = seed_turn(&h, student, "Can we go over slopes again").await;
	let res = h
		.service
		.check_escalation(check(student, "Can we go over slopes again", Some(turn)))
		.await
		.expect("check failed");

	assert!(!res.decision.routing_needed);
	assert_eq!(res.decision.confidence, 0.0);
	assert!(res.event.is_none());
	assert_eq!(h.llm_calls(), 3);
}

#[tokio::test]
async fn classifier_timeout_means_no_escalation() {
	let h = harness("unused", r#"{"routing_needed": true, "confidence": 0.95, "urgency": "high"}"#)
		.delay(Duration::from_millis(500))
		.config(|cfg| cfg.escalation.classifier_timeout_ms = 20)
		.build();
	let res = h
		.service
		.check_escalation(check(Uuid::new_v4(), "Tell me about photosynthesis", None))
		.await
		.expect("check failed");

	assert!(!res.decision.routing_needed);
	assert_eq!(res.decision.confidence, 0.0);
}

#[tokio::test]
async fn classifier_decisions_are_normalized() {
	let h = harness(
		"unused",
		r#"```json
{"routing_needed": true, "confidence": 0.75, "reason": "Confusion is not resolving.", "urgency": "high"}
```"#,
	)
	.build();
	let student = Uuid::new_v4();
	let turn = seed_turn(&h, student, "Can we go over slopes again").await;
	let res = h
		.service
		.check_escalation(check(student, "Can we go over slopes again", Some(turn)))
		.await
		.expect("check failed");

	assert!(res.decision.routing_needed);
	assert_eq!(res.decision.urgency, Urgency::Medium);
	assert_eq!(res.decision.triggers, vec!["llm_classifier".to_string()]);

	let event = res.event.expect("confidence above the event threshold records an event");

	assert_eq!(event.urgency, "medium");
}

#[tokio::test]
async fn low_confidence_routing_records_no_event() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let turn = seed_turn(&h, student, "I'm a little confused about slopes").await;
	let res = h
		.service
		.check_escalation(check(student, "I'm a little confused about slopes", Some(turn)))
		.await
		.expect("check failed");

	assert!(res.decision.routing_needed);
	assert_eq!(res.decision.confidence, 0.6);
	assert!(res.event.is_none());
}

#[tokio::test]
async fn resolving_marks_the_event_and_rejects_unknown_ids() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let turn = seed_turn(&h, student, "Can I talk to someone please").await;
	let res = h
		.service
		.check_escalation(check(student, "Can I talk to someone please", Some(turn)))
		.await
		.expect("check failed");
	let event = res.event.expect("expected an escalation event");
	let resolved = h
		.service
		.resolve_escalation(ResolveEscalationRequest { event_id: event.event_id })
		.await
		.expect("resolve failed");

	assert!(resolved.resolved);
	assert!(resolved.resolved_at.is_some());
	assert!(h.store.escalations(student, false).await.expect("escalations").is_empty());

	let missing =
		h.service.resolve_escalation(ResolveEscalationRequest { event_id: Uuid::new_v4() }).await;

	assert!(matches!(missing, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn events_require_a_turn_owned_by_the_student() {
	let h = harness("unused", NO_ROUTING).build();
	let owner = Uuid::new_v4();
	let intruder = Uuid::new_v4();
	let turn = seed_turn(&h, owner, "I want a real tutor").await;
	let owned = h
		.service
		.check_escalation(check(owner, "I want a real tutor", Some(turn)))
		.await
		.expect("check failed");

	assert!(owned.event.is_some());

	let foreign =
		h.service.check_escalation(check(intruder, "I want a real tutor", Some(turn))).await;

	assert!(matches!(foreign, Err(Error::NotFound { .. })));

	let unknown = h
		.service
		.check_escalation(check(owner, "I want a real tutor", Some(Uuid::new_v4())))
		.await;

	assert!(matches!(unknown, Err(Error::NotFound { .. })));
	assert!(h.store.escalations(intruder, true).await.expect("escalations").is_empty());
	assert_eq!(h.llm_calls(), 0);
}
