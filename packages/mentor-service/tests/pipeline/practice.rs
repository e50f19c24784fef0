use std::sync::atomic::{AtomicUsize, Ordering};

use time::OffsetDateTime;
use uuid::Uuid;

use mentor_service::{Error, GenerateProblemRequest, GoalRef, GradeRequest, GradeSource};
use mentor_storage::{
	Store,
	models::{PracticeProblem, Role},
};

use super::{Harness, NOT_JSON, failing_llm, harness, harness_with, turn};

const GENERATED: &str = r#"{"prompt": "Solve for x: 2x + 3 = 11.", "correct_answer": "x = 4", "solution_steps": ["Subtract 3.", "Divide by 2."]}"#;

pub async fn seed_problem(h: &Harness, student_id: Uuid, subject: &str) -> PracticeProblem {
	let problem = PracticeProblem {
		problem_id: Uuid::new_v4(),
		student_id,
		subject: subject.to_string(),
		topic: subject.to_string(),
		difficulty: 2,
		prompt: "Solve for x: 2x + 3 = 11.".to_string(),
		correct_answer: "x = 4".to_string(),
		solution_steps: vec!["Subtract 3.".to_string(), "Divide by 2.".to_string()],
		student_answer: None,
		is_correct: None,
		feedback: None,
		attempts_count: 0,
		created_at: OffsetDateTime::now_utc(),
		completed_at: None,
	};

	h.store.save_problem(&problem).await.expect("Failed to seed problem.");

	problem
}

fn generate(student_id: Uuid) -> GenerateProblemRequest {
	GenerateProblemRequest {
		student_id,
		subject: "algebra".to_string(),
		topic: None,
		difficulty: None,
		goal: None,
	}
}

#[tokio::test]
async fn generates_and_stores_a_problem_from_structured_output() {
	let h = harness("unused", GENERATED).build();
	let student = Uuid::new_v4();
	let mut req = generate(student);

	req.goal = Some(GoalRef { title: "Linear equations".to_string(), topic: None });

	let problem = h.service.generate_problem(req).await.expect("generate failed");

	assert_eq!(problem.topic, "Linear equations");
	assert_eq!(problem.difficulty, 1);
	assert_eq!(problem.correct_answer, "x = 4");
	assert_eq!(problem.solution_steps.len(), 2);
	assert_eq!(h.llm_calls(), 1);
	assert!(h.store.get_problem(problem.problem_id).await.expect("get failed").is_some());
	assert!(h.sink.event_names().contains(&"practice_generated".to_string()));
}

#[tokio::test]
async fn recent_struggles_bias_generation() {
	let prompts = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
	let seen = prompts.clone();
	let h = harness_with(move |_, req| {
		if let Some(user) = req.messages.last() {
			seen.lock().expect("prompts lock").push(user.content.clone());
		}

		Ok(GENERATED.to_string())
	})
	.build();
	let student = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	h.store
		.save_turn(&turn(
			student,
			Role::Student,
			"I'm stuck on factoring trinomials",
			Some("algebra"),
			now,
		))
		.await
		.expect("Failed to seed turn.");
	h.service.generate_problem(generate(student)).await.expect("generate failed");

	let prompts = prompts.lock().expect("prompts lock");

	assert!(prompts.iter().any(|prompt| prompt.contains("struggled with factoring trinomials")));
}

#[tokio::test]
async fn raw_text_is_used_when_structured_output_never_parses() {
	let raw = "Solve for y: y - 2 = 5.\nAnswer: y = 7";
	let h = harness("unused", raw).build();
	let problem =
		h.service.generate_problem(generate(Uuid::new_v4())).await.expect("generate failed");

	assert_eq!(problem.prompt, "Solve for y: y - 2 = 5.");
	assert_eq!(problem.correct_answer, "y = 7");
	assert_eq!(h.llm_calls(), 3);
}

#[tokio::test]
async fn generation_rejects_out_of_range_difficulty() {
	let h = harness("unused", GENERATED).build();
	let mut req = generate(Uuid::new_v4());

	req.difficulty = Some(6);

	assert!(matches!(h.service.generate_problem(req).await, Err(Error::InvalidRequest { .. })));
	assert_eq!(h.llm_calls(), 0);
}

#[tokio::test]
async fn model_grading_completes_a_correct_answer() {
	let h = harness("unused", r#"{"is_correct": true, "feedback": "Exactly right!"}"#).build();
	let problem = seed_problem(&h, Uuid::new_v4(), "algebra").await;
	let res = h
		.service
		.grade_problem(GradeRequest { problem_id: problem.problem_id, answer: "4".to_string() })
		.await
		.expect("grade failed");

	assert!(res.is_correct);
	assert!(res.completed);
	assert_eq!(res.source, GradeSource::Model);
	assert_eq!(res.feedback, "Exactly right!");
	assert_eq!(res.attempts_count, 1);
	assert!(res.correct_answer.is_none());

	let stored =
		h.store.get_problem(problem.problem_id).await.expect("get failed").expect("problem");

	assert!(stored.completed_at.is_some());
	assert_eq!(stored.student_answer.as_deref(), Some("4"));
}

#[tokio::test]
async fn string_match_grading_when_the_model_is_unavailable() {
	let h = failing_llm().build();
	let problem = seed_problem(&h, Uuid::new_v4(), "algebra").await;
	let res = h
		.service
		.grade_problem(GradeRequest { problem_id: problem.problem_id, answer: "X = 4".to_string() })
		.await
		.expect("grade failed");

	assert!(res.is_correct);
	assert_eq!(res.source, GradeSource::StringMatch);
}

#[tokio::test]
async fn string_match_grading_rejects_a_flipped_sign() {
	let h = failing_llm().build();
	let problem = seed_problem(&h, Uuid::new_v4(), "algebra").await;
	let res = h
		.service
		.grade_problem(GradeRequest {
			problem_id: problem.problem_id,
			answer: "x = -4".to_string(),
		})
		.await
		.expect("grade failed");

	assert!(!res.is_correct);
	assert!(!res.completed);
	assert_eq!(res.source, GradeSource::StringMatch);
	assert_eq!(res.attempts_count, 1);
}

#[tokio::test]
async fn final_wrong_attempt_reveals_the_solution_and_closes_the_problem() {
	let calls = std::sync::Arc::new(AtomicUsize::new(0));
	let counter = calls.clone();
	let h = harness_with(move |_, _| {
		counter.fetch_add(1, Ordering::SeqCst);

		Ok(NOT_JSON.to_string())
	})
	.build();
	let problem = seed_problem(&h, Uuid::new_v4(), "algebra").await;
	let grade =
		|answer: &str| GradeRequest { problem_id: problem.problem_id, answer: answer.to_string() };

	for attempt in 1..=2 {
		let res = h.service.grade_problem(grade("5")).await.expect("grade failed");

		assert!(!res.is_correct);
		assert!(!res.completed);
		assert_eq!(res.attempts_count, attempt);
		assert!(res.correct_answer.is_none());
	}

	let last = h.service.grade_problem(grade("6")).await.expect("grade failed");

	assert!(last.completed);
	assert_eq!(last.correct_answer.as_deref(), Some("x = 4"));
	assert_eq!(last.solution_steps.map(|steps| steps.len()), Some(2));
	assert!(calls.load(Ordering::SeqCst) >= 3);

	let closed = h.service.grade_problem(grade("4")).await;

	assert!(matches!(closed, Err(Error::Conflict { .. })));
}

#[tokio::test]
async fn grading_unknown_problems_is_not_found() {
	let h = harness("unused", "{}").build();
	let res = h
		.service
		.grade_problem(GradeRequest { problem_id: Uuid::new_v4(), answer: "4".to_string() })
		.await;

	assert!(matches!(res, Err(Error::NotFound { .. })));
}
