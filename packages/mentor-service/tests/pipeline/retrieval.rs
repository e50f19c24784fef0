use time::OffsetDateTime;
use uuid::Uuid;

use mentor_service::{ChunkSource, Error, RetrievalRequest};
use mentor_storage::{
	Store,
	models::{Role, SUMMARY_COMPLETED, SessionSummary},
};

use super::{Harness, NO_ROUTING, harness, turn};

fn summary(
	student_id: Uuid,
	subject: &str,
	text: &str,
	embedding: Option<Vec<f32>>,
	status: &str,
) -> SessionSummary {
	SessionSummary {
		session_id: Uuid::new_v4(),
		student_id,
		subject: subject.to_string(),
		topics: Vec::new(),
		summary_text: text.to_string(),
		embedding,
		status: status.to_string(),
		session_date: OffsetDateTime::now_utc(),
	}
}

fn request(student_id: Uuid, query: &str, threshold: f32) -> RetrievalRequest {
	RetrievalRequest {
		student_id,
		query: query.to_string(),
		top_k: None,
		threshold: Some(threshold),
		subject: Some("math".to_string()),
	}
}

async fn save(h: &Harness, summary: SessionSummary) {
	h.store.save_summary(&summary).await.expect("Failed to save summary.");
}

#[tokio::test]
async fn threshold_above_one_returns_nothing() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();

	save(&h, summary(student, "math", "Fractions review.", Some(vec![1.0; 4]), SUMMARY_COMPLETED))
		.await;

	let res =
		h.service.retrieve(request(student, "fractions", 1.01)).await.expect("retrieve failed");

	assert!(res.chunks.is_empty());
}

#[tokio::test]
async fn ranks_completed_summaries_in_subject_by_similarity() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();

	let partial = Some(vec![1.0, 0.0, 0.0, 0.0]);

	save(&h, summary(student, "math", "Partial match.", partial, SUMMARY_COMPLETED)).await;
	save(&h, summary(student, "math", "Exact match.", Some(vec![1.0; 4]), SUMMARY_COMPLETED)).await;
	save(&h, summary(student, "math", "Still running.", Some(vec![1.0; 4]), "in_progress")).await;
	save(&h, summary(student, "history", "Other subject.", Some(vec![1.0; 4]), SUMMARY_COMPLETED))
		.await;

	let res =
		h.service.retrieve(request(student, "fractions", 0.4)).await.expect("retrieve failed");
	let texts: Vec<_> = res.chunks.iter().map(|chunk| chunk.text.as_str()).collect();

	assert_eq!(texts, vec!["Exact match.", "Partial match."]);
	assert!((res.chunks[0].similarity - 1.0).abs() < 1e-6);
	assert!((res.chunks[1].similarity - 0.5).abs() < 1e-6);
	assert!(res.chunks.iter().all(|chunk| chunk.source == ChunkSource::SessionSummary));
}

#[tokio::test]
async fn embedding_failure_degrades_to_lexical_similarity() {
	let h = harness("unused", NO_ROUTING).failing_embedding().build();
	let student = Uuid::new_v4();

	save(
		&h,
		summary(
			student,
			"math",
			"Adding fractions with unlike denominators.",
			Some(vec![1.0; 4]),
			SUMMARY_COMPLETED,
		),
	)
	.await;
	save(&h, summary(student, "math", "Photosynthesis in plants.", None, SUMMARY_COMPLETED)).await;

	let res = h
		.service
		.retrieve(request(student, "adding fractions", 0.3))
		.await
		.expect("retrieve failed");

	assert_eq!(res.chunks.len(), 1);
	assert!(res.chunks[0].text.starts_with("Adding fractions"));
	assert!((0.0..=1.0).contains(&res.chunks[0].similarity));
}

#[tokio::test]
async fn conversation_pairs_are_retrieved_and_truncated_to_top_k() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	for idx in 0..3 {
		let mut question =
			turn(student, Role::Student, &format!("question {idx}"), Some("math"), now);

		question.embedding = Some(vec![1.0; 4]);

		h.store.save_turn(&question).await.expect("Failed to save turn.");
		h.store
			.save_turn(&turn(student, Role::Companion, &format!("answer {idx}"), Some("math"), now))
			.await
			.expect("Failed to save turn.");
	}

	let mut req = request(student, "question", 0.9);

	req.top_k = Some(2);

	let res = h.service.retrieve(req).await.expect("retrieve failed");

	assert_eq!(res.chunks.len(), 2);
	assert!(res.chunks.iter().all(|chunk| chunk.source == ChunkSource::Conversation));
	assert!(res.chunks[0].text.starts_with("Student: question"));
	assert!(res.chunks[0].text.contains("Companion: answer"));
}

#[tokio::test]
async fn blank_queries_are_rejected() {
	let h = harness("unused", NO_ROUTING).build();
	let res = h.service.retrieve(request(Uuid::new_v4(), "  ", 0.5)).await;

	assert!(matches!(res, Err(Error::InvalidRequest { .. })));
	assert_eq!(h.embed_calls(), 0);
}
