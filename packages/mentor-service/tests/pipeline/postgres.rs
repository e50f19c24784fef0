use std::sync::{Arc, atomic::AtomicUsize};

use uuid::Uuid;

use mentor_service::{Collaborators, MentorService, Providers};
use mentor_storage::{Store, db::Db, models::TurnFilter};
use mentor_testkit::TestDatabase;

use super::{
	NO_ROUTING, RecordingSink, SpyLlm, StubEmbedding, chat_request, subject_context, test_config,
};

#[tokio::test]
#[ignore = "Requires external Postgres. Set MENTOR_PG_DSN to run."]
async fn chat_turns_persist_to_postgres() {
	let Some(base_dsn) = mentor_testkit::env_dsn() else {
		eprintln!("Skipping chat_turns_persist_to_postgres; set MENTOR_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let mut cfg = test_config();

	cfg.storage.postgres.dsn = test_db.dsn().to_string();

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let db = Arc::new(db);
	let sink = Arc::new(RecordingSink::default());
	let llm = SpyLlm::scripted(|_, req| {
		Ok(if req.json_mode {
			NO_ROUTING.to_string()
		} else {
			"Let's begin with the units. What are we measuring?".to_string()
		})
	});
	let service = MentorService::with_providers(
		cfg,
		db.clone() as Arc<dyn Store>,
		Providers::new(
			Arc::new(StubEmbedding { calls: Arc::new(AtomicUsize::new(0)) }),
			Arc::new(llm),
		),
		Collaborators::new(sink.clone(), sink),
	);
	let student = Uuid::new_v4();
	let res = service
		.handle_chat_turn(chat_request(
			student,
			"How fast is 10 metres per second",
			subject_context("physics"),
		))
		.await
		.expect("chat turn failed");
	let turns = db
		.recent_turns(student, &TurnFilter::default(), 10)
		.await
		.expect("Failed to load turns.");

	assert_eq!(turns.len(), 2);
	assert_eq!(turns[0].turn_id, res.student_turn_id);
	assert_eq!(turns[0].embedding.as_ref().map(Vec::len), Some(4));
	assert_eq!(turns[1].text, res.reply_text);

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}
