use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use delve_domain::progress::Progress;
use delve_service::{
	Error as ServiceError, HistoryResponse, HistorySummary, ProgressSink, RefineRequest,
	ResearchRequest, ResearchResponse, SubqueriesRequest, SubqueriesResponse,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/subqueries", post(subqueries))
		.route("/v1/research", post(research))
		.route("/v1/history", get(list_history))
		.route("/v1/history/{filename}", get(get_history).delete(delete_history))
		.route("/v1/history/{filename}/refine", post(refine))
		.with_state(state)
}

/// Mirrors run milestones into the server log.
struct LogProgress;
impl ProgressSink for LogProgress {
	fn notify(&self, progress: &Progress) {
		tracing::info!(
			step = progress.step_index + 1,
			percent = progress.percent,
			message = %progress.message,
			"Research progress."
		);
	}
}

#[derive(Debug, Deserialize)]
struct RefineBody {
	question: String,
	k: Option<u32>,
	n: Option<u32>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn subqueries(
	State(state): State<AppState>,
	Json(payload): Json<SubqueriesRequest>,
) -> Result<Json<SubqueriesResponse>, ApiError> {
	let response = state.service.generate_subqueries(payload, &LogProgress).await?;

	Ok(Json(response))
}

async fn research(
	State(state): State<AppState>,
	Json(payload): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
	let response = state.service.research(payload, &LogProgress).await?;

	Ok(Json(response))
}

async fn list_history(
	State(state): State<AppState>,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
	let response = state.service.list_history().await?;

	Ok(Json(response))
}

async fn get_history(
	State(state): State<AppState>,
	Path(filename): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
	let response = state.service.get_history(&filename).await?;

	Ok(Json(response))
}

async fn delete_history(
	State(state): State<AppState>,
	Path(filename): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_history(&filename).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn refine(
	State(state): State<AppState>,
	Path(filename): Path<String>,
	Json(payload): Json<RefineBody>,
) -> Result<Json<ResearchResponse>, ApiError> {
	let req = RefineRequest { filename, question: payload.question, k: payload.k, n: payload.n };
	let response = state.service.refine(req, &LogProgress).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			ServiceError::NotFound { message } =>
				ApiError::new(StatusCode::NOT_FOUND, "not_found", message),
			ServiceError::NoUrlsToScrape =>
				ApiError::new(
					StatusCode::UNPROCESSABLE_ENTITY,
					"no_urls",
					"No valid URL to scrape.",
				),
			ServiceError::Provider { message } => {
				tracing::error!(error = %message, "Provider failure.");

				ApiError::new(StatusCode::BAD_GATEWAY, "provider_error", message)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage failure.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
