use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{
		ConversationTurn, EscalationEvent, PracticeProblem, SUMMARY_COMPLETED, SessionSummary,
		SummaryFilter, TurnFilter, TurnRow, UnderstandingSnapshot,
	},
};

pub async fn insert_turn(db: &Db, turn: &ConversationTurn) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO conversation_turns (
	turn_id,
	student_id,
	role,
	text,
	subject,
	practice_problem_id,
	session_id,
	metadata,
	embedding,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
	)
	.bind(turn.turn_id)
	.bind(turn.student_id)
	.bind(turn.role.as_str())
	.bind(turn.text.as_str())
	.bind(turn.subject.as_deref())
	.bind(turn.practice_problem_id)
	.bind(turn.session_id)
	.bind(&turn.metadata)
	.bind(turn.embedding.as_deref())
	.bind(turn.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn recent_turns(
	db: &Db,
	student_id: Uuid,
	filter: &TurnFilter,
	limit: u32,
) -> Result<Vec<ConversationTurn>> {
	let rows: Vec<TurnRow> = sqlx::query_as(
		"\
SELECT *
FROM (
	SELECT
		turn_id,
		student_id,
		role,
		text,
		subject,
		practice_problem_id,
		session_id,
		metadata,
		embedding,
		created_at
	FROM conversation_turns
	WHERE student_id = $1
		AND ($2::text IS NULL OR subject = $2)
		AND ($3::uuid IS NULL OR practice_problem_id = $3)
		AND ($4::text IS NULL OR role = $4)
		AND ($5::timestamptz IS NULL OR created_at > $5)
	ORDER BY created_at DESC, turn_id DESC
	LIMIT $6
) recent
ORDER BY created_at ASC, turn_id ASC",
	)
	.bind(student_id)
	.bind(filter.subject.as_deref())
	.bind(filter.practice_problem_id)
	.bind(filter.role.map(|role| role.as_str()))
	.bind(filter.since)
	.bind(i64::from(limit))
	.fetch_all(&db.pool)
	.await?;

	rows.into_iter().map(ConversationTurn::try_from).collect()
}

pub async fn get_turn(
	db: &Db,
	student_id: Uuid,
	turn_id: Uuid,
) -> Result<Option<ConversationTurn>> {
	let row: Option<TurnRow> = sqlx::query_as(
		"\
SELECT
	turn_id,
	student_id,
	role,
	text,
	subject,
	practice_problem_id,
	session_id,
	metadata,
	embedding,
	created_at
FROM conversation_turns
WHERE turn_id = $1 AND student_id = $2",
	)
	.bind(turn_id)
	.bind(student_id)
	.fetch_optional(&db.pool)
	.await?;

	row.map(ConversationTurn::try_from).transpose()
}

pub async fn count_turns(db: &Db, student_id: Uuid, filter: &TurnFilter) -> Result<u64> {
	let count: i64 = sqlx::query_scalar(
		"\
SELECT count(*)
FROM conversation_turns
WHERE student_id = $1
	AND ($2::text IS NULL OR subject = $2)
	AND ($3::uuid IS NULL OR practice_problem_id = $3)
	AND ($4::text IS NULL OR role = $4)
	AND ($5::timestamptz IS NULL OR created_at > $5)",
	)
	.bind(student_id)
	.bind(filter.subject.as_deref())
	.bind(filter.practice_problem_id)
	.bind(filter.role.map(|role| role.as_str()))
	.bind(filter.since)
	.fetch_one(&db.pool)
	.await?;

	Ok(count.max(0) as u64)
}

pub async fn upsert_summary(db: &Db, summary: &SessionSummary) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO session_summaries (
	session_id,
	student_id,
	subject,
	topics,
	summary_text,
	embedding,
	status,
	session_date
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
ON CONFLICT (session_id) DO UPDATE
SET
	subject = EXCLUDED.subject,
	topics = EXCLUDED.topics,
	summary_text = EXCLUDED.summary_text,
	embedding = EXCLUDED.embedding,
	status = EXCLUDED.status,
	session_date = EXCLUDED.session_date",
	)
	.bind(summary.session_id)
	.bind(summary.student_id)
	.bind(summary.subject.as_str())
	.bind(&summary.topics)
	.bind(summary.summary_text.as_str())
	.bind(summary.embedding.as_deref())
	.bind(summary.status.as_str())
	.bind(summary.session_date)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn recent_summaries(
	db: &Db,
	student_id: Uuid,
	filter: &SummaryFilter,
	limit: u32,
) -> Result<Vec<SessionSummary>> {
	let status = filter.completed_only.then_some(SUMMARY_COMPLETED);
	let rows = sqlx::query_as(
		"\
SELECT
	session_id,
	student_id,
	subject,
	topics,
	summary_text,
	embedding,
	status,
	session_date
FROM session_summaries
WHERE student_id = $1
	AND ($2::text IS NULL OR subject = $2)
	AND ($3::text IS NULL OR status = $3)
ORDER BY session_date DESC
LIMIT $4",
	)
	.bind(student_id)
	.bind(filter.subject.as_deref())
	.bind(status)
	.bind(i64::from(limit))
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn insert_snapshot(db: &Db, snapshot: &UnderstandingSnapshot) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO understanding_snapshots (
	snapshot_id,
	student_id,
	subject,
	topic,
	level,
	previous_level,
	session_date,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
	)
	.bind(snapshot.snapshot_id)
	.bind(snapshot.student_id)
	.bind(snapshot.subject.as_str())
	.bind(snapshot.topic.as_deref())
	.bind(snapshot.level)
	.bind(snapshot.previous_level)
	.bind(snapshot.session_date)
	.bind(snapshot.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn snapshots(
	db: &Db,
	student_id: Uuid,
	subject: &str,
) -> Result<Vec<UnderstandingSnapshot>> {
	let rows = sqlx::query_as(
		"\
SELECT
	snapshot_id,
	student_id,
	subject,
	topic,
	level,
	previous_level,
	session_date,
	created_at
FROM understanding_snapshots
WHERE student_id = $1 AND subject = $2
ORDER BY session_date ASC, created_at ASC",
	)
	.bind(student_id)
	.bind(subject)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn latest_snapshot(
	db: &Db,
	student_id: Uuid,
	subject: &str,
) -> Result<Option<UnderstandingSnapshot>> {
	let row = sqlx::query_as(
		"\
SELECT
	snapshot_id,
	student_id,
	subject,
	topic,
	level,
	previous_level,
	session_date,
	created_at
FROM understanding_snapshots
WHERE student_id = $1 AND subject = $2
ORDER BY session_date DESC, created_at DESC
LIMIT 1",
	)
	.bind(student_id)
	.bind(subject)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn insert_problem(db: &Db, problem: &PracticeProblem) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO practice_problems (
	problem_id,
	student_id,
	subject,
	topic,
	difficulty,
	prompt,
	correct_answer,
	solution_steps,
	student_answer,
	is_correct,
	feedback,
	attempts_count,
	created_at,
	completed_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
	)
	.bind(problem.problem_id)
	.bind(problem.student_id)
	.bind(problem.subject.as_str())
	.bind(problem.topic.as_str())
	.bind(problem.difficulty)
	.bind(problem.prompt.as_str())
	.bind(problem.correct_answer.as_str())
	.bind(&problem.solution_steps)
	.bind(problem.student_answer.as_deref())
	.bind(problem.is_correct)
	.bind(problem.feedback.as_deref())
	.bind(problem.attempts_count)
	.bind(problem.created_at)
	.bind(problem.completed_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_problem(db: &Db, problem_id: Uuid) -> Result<Option<PracticeProblem>> {
	let row = sqlx::query_as(
		"\
SELECT
	problem_id,
	student_id,
	subject,
	topic,
	difficulty,
	prompt,
	correct_answer,
	solution_steps,
	student_answer,
	is_correct,
	feedback,
	attempts_count,
	created_at,
	completed_at
FROM practice_problems
WHERE problem_id = $1",
	)
	.bind(problem_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

/// Completion fields are only written while the stored row is still incomplete.
pub async fn update_problem(db: &Db, problem: &PracticeProblem) -> Result<()> {
	let result = sqlx::query(
		"\
UPDATE practice_problems
SET
	student_answer = $1,
	is_correct = COALESCE(is_correct, $2),
	feedback = $3,
	attempts_count = $4,
	completed_at = COALESCE(completed_at, $5)
WHERE problem_id = $6",
	)
	.bind(problem.student_answer.as_deref())
	.bind(problem.is_correct)
	.bind(problem.feedback.as_deref())
	.bind(problem.attempts_count)
	.bind(problem.completed_at)
	.bind(problem.problem_id)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Practice problem {}.", problem.problem_id)));
	}

	Ok(())
}

pub async fn count_completed_problems(
	db: &Db,
	student_id: Uuid,
	subject: Option<&str>,
	since: Option<OffsetDateTime>,
) -> Result<u64> {
	let count: i64 = sqlx::query_scalar(
		"\
SELECT count(*)
FROM practice_problems
WHERE student_id = $1
	AND completed_at IS NOT NULL
	AND ($2::text IS NULL OR subject = $2)
	AND ($3::timestamptz IS NULL OR completed_at > $3)",
	)
	.bind(student_id)
	.bind(subject)
	.bind(since)
	.fetch_one(&db.pool)
	.await?;

	Ok(count.max(0) as u64)
}

pub async fn insert_escalation(db: &Db, event: &EscalationEvent) -> Result<EscalationEvent> {
	sqlx::query(
		"\
INSERT INTO escalation_events (
	event_id,
	student_id,
	triggering_turn_id,
	reason,
	confidence,
	urgency,
	triggers,
	resolved,
	created_at,
	resolved_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
ON CONFLICT (student_id, triggering_turn_id) DO NOTHING",
	)
	.bind(event.event_id)
	.bind(event.student_id)
	.bind(event.triggering_turn_id)
	.bind(event.reason.as_str())
	.bind(event.confidence)
	.bind(event.urgency.as_str())
	.bind(&event.triggers)
	.bind(event.resolved)
	.bind(event.created_at)
	.bind(event.resolved_at)
	.execute(&db.pool)
	.await?;

	let stored = sqlx::query_as(
		"\
SELECT
	event_id,
	student_id,
	triggering_turn_id,
	reason,
	confidence,
	urgency,
	triggers,
	resolved,
	created_at,
	resolved_at
FROM escalation_events
WHERE student_id = $1 AND triggering_turn_id = $2",
	)
	.bind(event.student_id)
	.bind(event.triggering_turn_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(stored)
}

pub async fn resolve_escalation(
	db: &Db,
	event_id: Uuid,
	resolved_at: OffsetDateTime,
) -> Result<EscalationEvent> {
	let row = sqlx::query_as(
		"\
UPDATE escalation_events
SET
	resolved = true,
	resolved_at = COALESCE(resolved_at, $2)
WHERE event_id = $1
RETURNING
	event_id,
	student_id,
	triggering_turn_id,
	reason,
	confidence,
	urgency,
	triggers,
	resolved,
	created_at,
	resolved_at",
	)
	.bind(event_id)
	.bind(resolved_at)
	.fetch_optional(&db.pool)
	.await?;

	row.ok_or_else(|| Error::NotFound(format!("Escalation event {event_id}.")))
}

pub async fn escalations(
	db: &Db,
	student_id: Uuid,
	include_resolved: bool,
) -> Result<Vec<EscalationEvent>> {
	let rows = sqlx::query_as(
		"\
SELECT
	event_id,
	student_id,
	triggering_turn_id,
	reason,
	confidence,
	urgency,
	triggers,
	resolved,
	created_at,
	resolved_at
FROM escalation_events
WHERE student_id = $1 AND ($2 OR NOT resolved)
ORDER BY created_at ASC",
	)
	.bind(student_id)
	.bind(include_resolved)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}
