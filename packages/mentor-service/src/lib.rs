pub mod chat;
pub mod difficulty;
pub mod escalation;
pub mod mastery;
pub mod practice;
pub mod retrieval;

mod error;
mod locks;
mod prompts;

pub use chat::{
	Attachment, ChatContext, ChatMode, ChatTurnRequest, ChatTurnResponse, EscalationNotice,
	StudentRef,
};
pub use difficulty::{DifficultyRequest, DifficultyResponse};
pub use error::{Error, Result};
pub use escalation::{EscalationCheckRequest, EscalationCheckResponse, ResolveEscalationRequest};
pub use mastery::{
	MasteryContext, MasterySnapshot, SessionIngestRequest, SessionIngestResponse,
	SessionSummaryInput,
};
pub use mentor_storage::BoxFuture;
pub use practice::{GenerateProblemRequest, GoalRef, GradeRequest, GradeResponse, GradeSource};
pub use retrieval::{ChunkSource, ContextChunk, RetrievalRequest, RetrievalResponse};

use std::sync::{Arc, Mutex};

use rand::{SeedableRng, rngs::StdRng};
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::locks::{StudentGuard, StudentLocks};
use mentor_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use mentor_providers::{
	embedding,
	llm::{self, Completion, CompletionRequest},
};
use mentor_storage::Store;

const STRUCTURED_ATTEMPTS: usize = 3;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<Vec<f32>>>>;
}

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		req: &'a CompletionRequest,
	) -> BoxFuture<'a, mentor_providers::Result<Completion>>;
}

/// Analytics sink. Failures are logged by the caller and never abort a flow.
pub trait Telemetry
where
	Self: Send + Sync,
{
	fn track_event<'a>(&'a self, event: &'a TelemetryEvent) -> BoxFuture<'a, Result<()>>;

	fn track_cost<'a>(&'a self, cost: &'a CostRecord) -> BoxFuture<'a, Result<()>>;
}

/// Tutor-facing notification channel.
pub trait Notifier
where
	Self: Send + Sync,
{
	fn create_study_note<'a>(&'a self, note: &'a StudyNote) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct TelemetryEvent {
	pub name: String,
	pub student_id: Uuid,
	pub properties: Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CostRecord {
	pub student_id: Uuid,
	pub purpose: String,
	pub provider_id: String,
	pub model: String,
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StudyNote {
	pub student_id: Uuid,
	pub subject: Option<String>,
	pub concept: String,
	pub message: String,
	#[serde(with = "mentor_storage::time_serde")]
	pub created_at: OffsetDateTime,
}

/// Structured model output, or the raw text when no attempt parsed.
#[derive(Debug)]
pub(crate) enum Structured<T> {
	Parsed(T),
	Raw(String),
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub llm: Arc<dyn LlmProvider>,
}

#[derive(Clone)]
pub struct Collaborators {
	pub telemetry: Arc<dyn Telemetry>,
	pub notifier: Arc<dyn Notifier>,
}

pub struct MentorService {
	pub cfg: Config,
	pub store: Arc<dyn Store>,
	pub providers: Providers,
	pub collaborators: Collaborators,
	rng: Mutex<StdRng>,
	student_locks: StudentLocks,
}

struct DefaultProviders;

struct LogCollaborators;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, mentor_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl LlmProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		req: &'a CompletionRequest,
	) -> BoxFuture<'a, mentor_providers::Result<Completion>> {
		Box::pin(llm::complete(cfg, req))
	}
}

impl Telemetry for LogCollaborators {
	fn track_event<'a>(&'a self, event: &'a TelemetryEvent) -> BoxFuture<'a, Result<()>> {
		tracing::info!(
			event = %event.name,
			student_id = %event.student_id,
			properties = %event.properties,
			"Telemetry event."
		);

		Box::pin(async { Ok(()) })
	}

	fn track_cost<'a>(&'a self, cost: &'a CostRecord) -> BoxFuture<'a, Result<()>> {
		tracing::info!(
			purpose = %cost.purpose,
			provider_id = %cost.provider_id,
			model = %cost.model,
			prompt_tokens = cost.prompt_tokens,
			completion_tokens = cost.completion_tokens,
			"LLM usage."
		);

		Box::pin(async { Ok(()) })
	}
}

impl Notifier for LogCollaborators {
	fn create_study_note<'a>(&'a self, note: &'a StudyNote) -> BoxFuture<'a, Result<()>> {
		tracing::info!(
			student_id = %note.student_id,
			subject = note.subject.as_deref().unwrap_or("general"),
			concept = %note.concept,
			"Study note created."
		);

		Box::pin(async { Ok(()) })
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, llm: Arc<dyn LlmProvider>) -> Self {
		Self { embedding, llm }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), llm: provider }
	}
}

impl Collaborators {
	pub fn new(telemetry: Arc<dyn Telemetry>, notifier: Arc<dyn Notifier>) -> Self {
		Self { telemetry, notifier }
	}
}

impl Default for Collaborators {
	fn default() -> Self {
		let sink = Arc::new(LogCollaborators);

		Self { telemetry: sink.clone(), notifier: sink }
	}
}

impl MentorService {
	pub fn new(cfg: Config, store: Arc<dyn Store>) -> Self {
		Self::with_providers(cfg, store, Providers::default(), Collaborators::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn Store>,
		providers: Providers,
		collaborators: Collaborators,
	) -> Self {
		let rng = match cfg.mastery.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_os_rng(),
		};

		Self {
			cfg,
			store,
			providers,
			collaborators,
			rng: Mutex::new(rng),
			student_locks: StudentLocks::default(),
		}
	}

	pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
		let mut rng = self.rng.lock().unwrap_or_else(|err| err.into_inner());

		f(&mut rng)
	}

	/// Serialises turn handling per student so appends and read-backs observe arrival order.
	pub(crate) async fn lock_student(&self, student_id: Uuid) -> StudentGuard {
		self.student_locks.acquire(student_id).await
	}

	/// Embeds one text, returning `None` when the provider fails or returns an unusable vector.
	pub(crate) async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text.to_string()];

		match self.providers.embedding.embed(cfg, &texts).await {
			Ok(vectors) => {
				let vec = vectors.into_iter().next()?;

				if vec.len() != cfg.dimensions as usize {
					tracing::warn!(
						expected = cfg.dimensions,
						actual = vec.len(),
						"Embedding dimension mismatch. Falling back to lexical similarity."
					);

					return None;
				}

				Some(vec)
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Embedding failed. Falling back to lexical similarity."
				);

				None
			},
		}
	}

	/// Completes with the primary vendor, then the fallback vendor when one is configured.
	pub(crate) async fn complete(
		&self,
		req: &CompletionRequest,
		purpose: &str,
		student_id: Uuid,
	) -> Result<Completion> {
		let primary = &self.cfg.providers.llm;
		let primary_err = match self.providers.llm.complete(primary, req).await {
			Ok(completion) => {
				self.track_cost(student_id, purpose, primary, &completion).await;

				return Ok(completion);
			},
			Err(err) => err,
		};

		tracing::warn!(
			error = %primary_err,
			provider_id = %primary.provider_id,
			purpose,
			"Primary LLM call failed."
		);

		let Some(fallback) = self.cfg.providers.llm_fallback.as_ref() else {
			return Err(primary_err.into());
		};
		let completion = self.providers.llm.complete(fallback, req).await.map_err(|err| {
			tracing::warn!(
				error = %err,
				provider_id = %fallback.provider_id,
				purpose,
				"Fallback LLM call failed."
			);

			Error::from(err)
		})?;

		self.track_cost(student_id, purpose, fallback, &completion).await;

		Ok(completion)
	}

	/// JSON-mode completion with retries on malformed output. Provider failures on every
	/// attempt are an error; malformed output on every attempt yields the last raw text.
	pub(crate) async fn complete_structured<T>(
		&self,
		req: &CompletionRequest,
		purpose: &str,
		student_id: Uuid,
	) -> Result<Structured<T>>
	where
		T: DeserializeOwned,
	{
		let mut req = req.clone();

		req.json_mode = true;

		let mut last_raw = None;
		let mut last_err = None;

		for attempt in 1..=STRUCTURED_ATTEMPTS {
			match self.complete(&req, purpose, student_id).await {
				Ok(completion) => match mentor_providers::json::parse_structured(&completion.text) {
					Ok(parsed) => return Ok(Structured::Parsed(parsed)),
					Err(err) => {
						tracing::warn!(
							attempt,
							purpose,
							error = %err,
							"Structured output was malformed."
						);

						last_raw = Some(completion.text);
					},
				},
				Err(err) => last_err = Some(err),
			}
		}

		match (last_raw, last_err) {
			(Some(raw), _) => Ok(Structured::Raw(raw)),
			(None, Some(err)) => Err(err),
			(None, None) => Err(Error::Provider {
				message: "Structured completion produced no output.".to_string(),
			}),
		}
	}

	pub(crate) async fn track_event(&self, name: &str, student_id: Uuid, properties: Value) {
		let event = TelemetryEvent { name: name.to_string(), student_id, properties };

		if let Err(err) = self.collaborators.telemetry.track_event(&event).await {
			tracing::warn!(error = %err, event = name, "Failed to track event.");
		}
	}

	pub(crate) async fn write_study_note(&self, note: StudyNote) {
		if let Err(err) = self.collaborators.notifier.create_study_note(&note).await {
			tracing::warn!(
				error = %err,
				student_id = %note.student_id,
				"Failed to create study note."
			);
		}
	}

	async fn track_cost(
		&self,
		student_id: Uuid,
		purpose: &str,
		cfg: &LlmProviderConfig,
		completion: &Completion,
	) {
		let cost = CostRecord {
			student_id,
			purpose: purpose.to_string(),
			provider_id: cfg.provider_id.clone(),
			model: completion.model.clone(),
			prompt_tokens: completion.prompt_tokens,
			completion_tokens: completion.completion_tokens,
		};

		if let Err(err) = self.collaborators.telemetry.track_cost(&cost).await {
			tracing::warn!(error = %err, purpose, "Failed to track cost.");
		}
	}
}

pub(crate) fn now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|value| !value.is_empty())
}
