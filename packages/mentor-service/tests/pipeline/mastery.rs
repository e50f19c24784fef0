use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use mentor_domain::difficulty::{Scale, Trend};
use mentor_service::{DifficultyRequest, SessionIngestRequest, SessionSummaryInput};
use mentor_storage::{
	Store,
	models::{Role, SummaryFilter, UnderstandingSnapshot},
};

use super::{Harness, NO_ROUTING, harness, turn};

fn ingest(student_id: Uuid, session_date: OffsetDateTime) -> SessionIngestRequest {
	SessionIngestRequest {
		student_id,
		subject: "math".to_string(),
		topic: Some("fractions".to_string()),
		session_id: None,
		session_date,
		summary: None,
	}
}

async fn seed_levels(h: &Harness, student_id: Uuid, levels: &[(f32, &str)]) {
	let start = OffsetDateTime::now_utc() - Duration::days(30);

	for (idx, (level, topic)) in levels.iter().enumerate() {
		let at = start + Duration::days(idx as i64);

		h.store
			.save_snapshot(&UnderstandingSnapshot {
				snapshot_id: Uuid::new_v4(),
				student_id,
				subject: "math".to_string(),
				topic: Some(topic.to_string()),
				level: *level,
				previous_level: None,
				session_date: at,
				created_at: at,
			})
			.await
			.expect("Failed to seed snapshot.");
	}
}

async fn difficulty(h: &Harness, student_id: Uuid, scale: Scale) -> u8 {
	h.service
		.recommend_difficulty(DifficultyRequest { student_id, subject: "math".to_string(), scale })
		.await
		.expect("difficulty failed")
		.difficulty
}

#[tokio::test]
async fn first_session_seeds_a_low_level() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let res = h
		.service
		.ingest_session(ingest(student, OffsetDateTime::now_utc()))
		.await
		.expect("ingest failed");

	assert!((0.0..=20.0).contains(&res.snapshot.level));
	assert!(res.snapshot.previous_level.is_none());
	assert!(!res.summary_stored);
}

#[tokio::test]
async fn progression_stays_within_bounds_and_rewards_activity() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let first_date = OffsetDateTime::now_utc() - Duration::days(10);
	let first = h.service.ingest_session(ingest(student, first_date)).await.expect("ingest failed");
	let now = OffsetDateTime::now_utc();

	for idx in 0..11 {
		h.store
			.save_turn(&turn(student, Role::Companion, &format!("hint {idx}"), Some("math"), now))
			.await
			.expect("Failed to seed turn.");
	}

	let second = h.service.ingest_session(ingest(student, now)).await.expect("ingest failed");
	let previous = second.snapshot.previous_level.expect("expected a previous level");

	assert_eq!(previous, first.snapshot.level);
	assert!(second.snapshot.level >= (previous + 12.0).min(100.0));
	assert!(second.snapshot.level <= previous + 5.0 + 15.0);
	assert!((0.0..=100.0).contains(&second.snapshot.level));
}

#[tokio::test]
async fn seeded_rng_reproduces_levels() {
	let date = OffsetDateTime::now_utc();
	let a = harness("unused", NO_ROUTING).build();
	let b = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let left = a.service.compute_snapshot(student, "math", date).await.expect("compute failed");
	let right = b.service.compute_snapshot(student, "math", date).await.expect("compute failed");

	assert_eq!(left.level, right.level);
}

#[tokio::test]
async fn long_gaps_decay_before_progressing() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();

	seed_levels(&h, student, &[(60.0, "fractions")]).await;

	let later = OffsetDateTime::now_utc() + Duration::days(120);
	let snapshot =
		h.service.compute_snapshot(student, "math", later).await.expect("compute failed");

	assert!(snapshot.decayed);
	assert!(snapshot.level <= 60.0 - 3.0 + 5.0);
	assert!(snapshot.level >= 60.0 - 5.0);
}

#[tokio::test]
async fn summaries_are_stored_for_retrieval() {
	let h = harness("unused", NO_ROUTING).build();
	let student = Uuid::new_v4();
	let mut req = ingest(student, OffsetDateTime::now_utc());

	req.summary = Some(SessionSummaryInput {
		summary_text: "Practised adding fractions with unlike denominators.".to_string(),
		topics: vec!["fractions".to_string()],
		status: None,
	});

	let res = h.service.ingest_session(req).await.expect("ingest failed");

	assert!(res.summary_stored);

	let summaries = h
		.store
		.recent_summaries(student, &SummaryFilter { subject: None, completed_only: true }, 10)
		.await
		.expect("Failed to load summaries.");

	assert_eq!(summaries.len(), 1);
	assert!(summaries[0].embedding.is_some());
}

#[tokio::test]
async fn difficulty_follows_mastery_trend_and_weakest_topic() {
	let h = harness("unused", NO_ROUTING).build();
	let flat_40 = Uuid::new_v4();

	seed_levels(&h, flat_40, &[(40.0, "fractions"), (40.0, "decimals"), (40.0, "fractions")]).await;

	assert_eq!(difficulty(&h, flat_40, Scale::Coarse).await, 1);
	assert_eq!(difficulty(&h, flat_40, Scale::Fine).await, 2);

	let flat_80 = Uuid::new_v4();

	seed_levels(&h, flat_80, &[(80.0, "ratios"), (80.0, "ratios")]).await;

	assert_eq!(difficulty(&h, flat_80, Scale::Coarse).await, 3);
	assert_eq!(difficulty(&h, flat_80, Scale::Fine).await, 4);

	let rising = Uuid::new_v4();

	seed_levels(&h, rising, &[(35.0, "decimals"), (60.0, "fractions"), (70.0, "fractions")]).await;

	let res = h
		.service
		.recommend_difficulty(DifficultyRequest {
			student_id: rising,
			subject: "math".to_string(),
			scale: Scale::Fine,
		})
		.await
		.expect("difficulty failed");

	assert_eq!(res.trend, Trend::Improving);
	assert_eq!(res.difficulty, 4);
	assert_eq!(res.weakest_topic.as_deref(), Some("decimals"));
}

#[tokio::test]
async fn unknown_students_start_at_the_easiest_level() {
	let h = harness("unused", NO_ROUTING).build();
	let res = h
		.service
		.recommend_difficulty(DifficultyRequest {
			student_id: Uuid::new_v4(),
			subject: "math".to_string(),
			scale: Scale::Fine,
		})
		.await
		.expect("difficulty failed");

	assert_eq!(res.difficulty, 1);
	assert_eq!(res.mastery, 0.0);
	assert_eq!(res.trend, Trend::Flat);
}
