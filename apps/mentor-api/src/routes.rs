use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use mentor_service::{
	ChatTurnRequest, ChatTurnResponse, DifficultyRequest, DifficultyResponse,
	EscalationCheckRequest, EscalationCheckResponse, GenerateProblemRequest, GradeRequest,
	GradeResponse, ResolveEscalationRequest, RetrievalRequest, RetrievalResponse,
	SessionIngestRequest, SessionIngestResponse,
};
use mentor_storage::models::{EscalationEvent, PracticeProblem};

use crate::state::AppState;

type ServiceError = mentor_service::Error;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat/turns", post(chat_turn))
		.route("/v1/retrieval/search", post(retrieve))
		.route("/v1/mastery/sessions", post(ingest_session))
		.route("/v1/mastery/difficulty", post(difficulty))
		.route("/v1/escalation/check", post(check_escalation))
		.route("/v1/escalation/resolve", post(resolve_escalation))
		.route("/v1/practice/problems", post(generate_problem))
		.route("/v1/practice/grade", post(grade_problem))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn chat_turn(
	State(state): State<AppState>,
	Json(payload): Json<ChatTurnRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
	let response = state.service.handle_chat_turn(payload).await?;

	Ok(Json(response))
}

async fn retrieve(
	State(state): State<AppState>,
	Json(payload): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResponse>, ApiError> {
	let response = state.service.retrieve(payload).await?;

	Ok(Json(response))
}

async fn ingest_session(
	State(state): State<AppState>,
	Json(payload): Json<SessionIngestRequest>,
) -> Result<Json<SessionIngestResponse>, ApiError> {
	let response = state.service.ingest_session(payload).await?;

	Ok(Json(response))
}

async fn difficulty(
	State(state): State<AppState>,
	Json(payload): Json<DifficultyRequest>,
) -> Result<Json<DifficultyResponse>, ApiError> {
	let response = state.service.recommend_difficulty(payload).await?;

	Ok(Json(response))
}

async fn check_escalation(
	State(state): State<AppState>,
	Json(payload): Json<EscalationCheckRequest>,
) -> Result<Json<EscalationCheckResponse>, ApiError> {
	let response = state.service.check_escalation(payload).await?;

	Ok(Json(response))
}

async fn resolve_escalation(
	State(state): State<AppState>,
	Json(payload): Json<ResolveEscalationRequest>,
) -> Result<Json<EscalationEvent>, ApiError> {
	let response = state.service.resolve_escalation(payload).await?;

	Ok(Json(response))
}

async fn generate_problem(
	State(state): State<AppState>,
	Json(payload): Json<GenerateProblemRequest>,
) -> Result<Json<PracticeProblem>, ApiError> {
	let response = state.service.generate_problem(payload).await?;

	Ok(Json(response))
}

async fn grade_problem(
	State(state): State<AppState>,
	Json(payload): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
	let response = state.service.grade_problem(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message, None),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "conflict", message, None),
			ServiceError::Provider { message } => {
				tracing::error!(error = %message, "Provider failure surfaced to caller.");

				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage failure surfaced to caller.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message, None)
			},
			ServiceError::Collaborator { message } => json_error(
				StatusCode::INTERNAL_SERVER_ERROR,
				"collaborator_error",
				message,
				None,
			),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
