use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, MentorService, Result};
use mentor_domain::{
	difficulty::{self, TopicReading, Trend},
	mastery::{self, MasteryHistory},
};
use mentor_storage::models::{
	Role, SUMMARY_COMPLETED, SessionSummary, TurnFilter, UnderstandingSnapshot,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MasterySnapshot {
	pub student_id: Uuid,
	pub subject: String,
	pub level: f32,
	pub previous_level: Option<f32>,
	pub decayed: bool,
	#[serde(with = "mentor_storage::time_serde")]
	pub session_date: OffsetDateTime,
}

/// Current standing in one subject, derived from the snapshot history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MasteryContext {
	pub level: f32,
	pub trend: Trend,
	pub weakest_topic: Option<String>,
	pub readings: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionSummaryInput {
	pub summary_text: String,
	#[serde(default)]
	pub topics: Vec<String>,
	/// Defaults to `completed`.
	pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionIngestRequest {
	pub student_id: Uuid,
	pub subject: String,
	pub topic: Option<String>,
	pub session_id: Option<Uuid>,
	#[serde(with = "mentor_storage::time_serde")]
	pub session_date: OffsetDateTime,
	pub summary: Option<SessionSummaryInput>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionIngestResponse {
	pub snapshot: UnderstandingSnapshot,
	pub summary_stored: bool,
}

impl MentorService {
	pub async fn compute_snapshot(
		&self,
		student_id: Uuid,
		subject: &str,
		session_date: OffsetDateTime,
	) -> Result<MasterySnapshot> {
		let subject = subject.trim();

		if subject.is_empty() {
			return Err(Error::invalid("subject must be non-empty."));
		}

		let snapshots = self.store.snapshots(student_id, subject).await?;
		let history = match history_bounds(&snapshots) {
			Some((max_level, last_session_date)) => {
				let companion_turns = TurnFilter {
					subject: Some(subject.to_string()),
					role: Some(Role::Companion),
					since: Some(last_session_date),
					..Default::default()
				};
				let turns = self.store.count_turns(student_id, &companion_turns).await?;
				let problems = self
					.store
					.count_completed_problems(student_id, Some(subject), Some(last_session_date))
					.await?;

				Some(MasteryHistory {
					max_level,
					last_session_date,
					interactions: u32::try_from(turns + problems).unwrap_or(u32::MAX),
				})
			},
			None => None,
		};
		let level = self.with_rng(|rng| {
			mastery::progress(history.as_ref(), session_date, &self.cfg.mastery, rng)
		});

		Ok(MasterySnapshot {
			student_id,
			subject: subject.to_string(),
			level: level.level,
			previous_level: level.previous_level,
			decayed: level.decayed,
			session_date,
		})
	}

	/// Appends a new understanding snapshot and, when given, stores the session summary so
	/// retrieval can find it.
	pub async fn ingest_session(&self, req: SessionIngestRequest) -> Result<SessionIngestResponse> {
		if let Some(summary) = req.summary.as_ref()
			&& summary.summary_text.trim().is_empty()
		{
			return Err(Error::invalid("summary.summary_text must be non-empty."));
		}

		let _guard = self.lock_student(req.student_id).await;
		let computed = self.compute_snapshot(req.student_id, &req.subject, req.session_date).await?;
		let snapshot = UnderstandingSnapshot {
			snapshot_id: Uuid::new_v4(),
			student_id: req.student_id,
			subject: computed.subject.clone(),
			topic: crate::non_empty(req.topic.as_deref()).map(str::to_string),
			level: computed.level,
			previous_level: computed.previous_level,
			session_date: req.session_date,
			created_at: crate::now(),
		};

		self.store.save_snapshot(&snapshot).await?;

		tracing::info!(
			student_id = %req.student_id,
			subject = %snapshot.subject,
			level = snapshot.level,
			decayed = computed.decayed,
			"Understanding snapshot recorded."
		);

		let mut summary_stored = false;

		if let Some(input) = req.summary {
			let embedding = self.embed_text(&input.summary_text).await;
			let summary = SessionSummary {
				session_id: req.session_id.unwrap_or_else(Uuid::new_v4),
				student_id: req.student_id,
				subject: snapshot.subject.clone(),
				topics: input.topics,
				summary_text: input.summary_text,
				embedding,
				status: crate::non_empty(input.status.as_deref())
					.unwrap_or(SUMMARY_COMPLETED)
					.to_string(),
				session_date: req.session_date,
			};

			self.store.save_summary(&summary).await?;

			summary_stored = true;
		}

		Ok(SessionIngestResponse { snapshot, summary_stored })
	}

	/// `None` when the student has no readings in `subject` yet.
	pub async fn mastery_context(
		&self,
		student_id: Uuid,
		subject: &str,
	) -> Result<Option<MasteryContext>> {
		let snapshots = self.store.snapshots(student_id, subject).await?;
		let Some(latest) = snapshots.last() else {
			return Ok(None);
		};
		let levels: Vec<f32> = snapshots.iter().map(|snapshot| snapshot.level).collect();
		let topics: Vec<TopicReading> = snapshots
			.iter()
			.filter_map(|snapshot| {
				snapshot.topic.as_ref().map(|topic| TopicReading {
					topic: topic.clone(),
					level: snapshot.level,
					recorded_at: snapshot.created_at,
				})
			})
			.collect();

		Ok(Some(MasteryContext {
			level: latest.level,
			trend: difficulty::trend_from_readings(&levels, self.cfg.mastery.trend_window as usize),
			weakest_topic: difficulty::weakest_topic(&topics).map(|reading| reading.topic.clone()),
			readings: snapshots.len(),
		}))
	}
}

/// Highest recorded level and the most recent session date.
fn history_bounds(snapshots: &[UnderstandingSnapshot]) -> Option<(f32, OffsetDateTime)> {
	let max_level = snapshots.iter().map(|snapshot| snapshot.level).max_by(|a, b| a.total_cmp(b))?;
	let last_session_date = snapshots.iter().map(|snapshot| snapshot.session_date).max()?;

	Some((max_level, last_session_date))
}
