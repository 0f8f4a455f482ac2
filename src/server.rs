use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::llm::ReplyModel;
use crate::models::{ErrorPayload, HealthReport, ReplyRequest, ReplyResult, StoredInteraction};
use crate::store::{InteractionSink, SaveOutcome};

const WELCOME_MESSAGE: &str = "Welcome to the Social Media Reply Generator API!";

/// Dependencies shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    model: Arc<dyn ReplyModel>,
    store: Arc<dyn InteractionSink>,
}

impl AppState {
    pub fn new(model: Arc<dyn ReplyModel>, store: Arc<dyn InteractionSink>) -> Self {
        Self { model, store }
    }

    fn health(&self) -> HealthReport {
        HealthReport::new(self.store.is_connected(), self.model.is_available())
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    ModelUnavailable,
    GenerationFailed,
    Unexpected(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GenerationFailed | ApiError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::InvalidInput(detail) => detail.clone(),
            ApiError::ModelUnavailable => {
                "LLM service is not configured or unavailable.".to_string()
            }
            ApiError::GenerationFailed => {
                "Failed to generate reply using the language model.".to_string()
            }
            ApiError::Unexpected(message) => {
                format!("An unexpected error occurred during reply generation: {message}")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorPayload {
            detail: self.detail(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn root() -> Json<Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

fn snippet(text: &str) -> String {
    text.chars().take(50).collect()
}

async fn create_reply(
    State(state): State<AppState>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyResult>, ApiError> {
    let Json(request) = payload?;
    if let Some(field) = request.empty_field() {
        return Err(ApiError::InvalidInput(format!("Field '{field}' must not be empty")));
    }

    if !state.model.is_available() {
        warn!("Rejecting reply request: LLM service is not available");
        return Err(ApiError::ModelUnavailable);
    }

    info!(
        "Received request for platform: {}, post: '{}...'",
        request.platform,
        snippet(&request.post_text)
    );

    let generated_reply = match state
        .model
        .generate_reply(&request.platform, &request.post_text)
        .await
    {
        Ok(Some(reply)) if !reply.is_empty() => reply,
        Ok(_) => {
            error!("LLM failed to generate a reply");
            return Err(ApiError::GenerationFailed);
        }
        Err(e) => {
            error!("Unexpected error during reply generation: {:#}", e);
            return Err(ApiError::Unexpected(format!("{:#}", e)));
        }
    };
    info!("LLM generated reply: '{}...'", snippet(&generated_reply));

    let result = ReplyResult {
        platform: request.platform,
        post_text: request.post_text,
        generated_reply,
    };

    if state.store.is_connected() {
        match state.store.insert(&StoredInteraction::new(result.clone())).await {
            SaveOutcome::Saved(id) => info!("Reply interaction saved with ID: {}", id),
            SaveOutcome::NotSaved(reason) => warn!(
                "Failed to save the reply ({}), returning generated reply anyway",
                reason
            ),
        }
    } else {
        warn!("Store not connected. Skipping save operation.");
    }

    Ok(Json(result))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/reply", post(create_reply))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
