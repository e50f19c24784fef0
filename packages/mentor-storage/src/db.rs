use sqlx::{PgPool, postgres::PgPoolOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Result, Store,
	models::{
		ConversationTurn, EscalationEvent, PracticeProblem, SessionSummary, SummaryFilter,
		TurnFilter, UnderstandingSnapshot,
	},
	queries, schema,
};

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &mentor_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		let lock_id: i64 = 6_021_337;
		// Advisory locks are held per connection, so take it inside the transaction that runs
		// the DDL.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}
impl Store for Db {
	fn save_turn<'a>(&'a self, turn: &'a ConversationTurn) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::insert_turn(self, turn))
	}

	fn recent_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationTurn>>> {
		Box::pin(queries::recent_turns(self, student_id, filter, limit))
	}

	fn get_turn(
		&self,
		student_id: Uuid,
		turn_id: Uuid,
	) -> BoxFuture<'_, Result<Option<ConversationTurn>>> {
		Box::pin(queries::get_turn(self, student_id, turn_id))
	}

	fn count_turns<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a TurnFilter,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(queries::count_turns(self, student_id, filter))
	}

	fn save_summary<'a>(&'a self, summary: &'a SessionSummary) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::upsert_summary(self, summary))
	}

	fn recent_summaries<'a>(
		&'a self,
		student_id: Uuid,
		filter: &'a SummaryFilter,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<SessionSummary>>> {
		Box::pin(queries::recent_summaries(self, student_id, filter, limit))
	}

	fn save_snapshot<'a>(
		&'a self,
		snapshot: &'a UnderstandingSnapshot,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::insert_snapshot(self, snapshot))
	}

	fn latest_snapshot<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Option<UnderstandingSnapshot>>> {
		Box::pin(queries::latest_snapshot(self, student_id, subject))
	}

	fn snapshots<'a>(
		&'a self,
		student_id: Uuid,
		subject: &'a str,
	) -> BoxFuture<'a, Result<Vec<UnderstandingSnapshot>>> {
		Box::pin(queries::snapshots(self, student_id, subject))
	}

	fn save_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::insert_problem(self, problem))
	}

	fn get_problem(&self, problem_id: Uuid) -> BoxFuture<'_, Result<Option<PracticeProblem>>> {
		Box::pin(queries::get_problem(self, problem_id))
	}

	fn update_problem<'a>(&'a self, problem: &'a PracticeProblem) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::update_problem(self, problem))
	}

	fn count_completed_problems<'a>(
		&'a self,
		student_id: Uuid,
		subject: Option<&'a str>,
		since: Option<OffsetDateTime>,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(queries::count_completed_problems(self, student_id, subject, since))
	}

	fn insert_escalation<'a>(
		&'a self,
		event: &'a EscalationEvent,
	) -> BoxFuture<'a, Result<EscalationEvent>> {
		Box::pin(queries::insert_escalation(self, event))
	}

	fn resolve_escalation(
		&self,
		event_id: Uuid,
		resolved_at: OffsetDateTime,
	) -> BoxFuture<'_, Result<EscalationEvent>> {
		Box::pin(queries::resolve_escalation(self, event_id, resolved_at))
	}

	fn escalations(
		&self,
		student_id: Uuid,
		include_resolved: bool,
	) -> BoxFuture<'_, Result<Vec<EscalationEvent>>> {
		Box::pin(queries::escalations(self, student_id, include_resolved))
	}
}
