//! HTTP surface: `/health`, `/models`, and `POST /translate`.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;
use polyglot_core::{Error, ModelsSummary, TranslateRequest, TranslateResult};

/// Build the router over the shared state.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/translate", post(translate))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Logical model names with a ready adapter instance.
    loaded_adapters: Vec<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        loaded_adapters: state.service.loaded_adapters(),
    })
}

async fn models(State(state): State<Arc<AppState>>) -> Json<ModelsSummary> {
    Json(state.service.models())
}

async fn translate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<TranslateResult>, ApiError> {
    let result = state.service.translate(&req).await?;
    Ok(Json(result))
}

/// Wrapper mapping core errors onto HTTP statuses with a `{"detail": ...}`
/// body: 400 for bad requests, 404 for unknown models, 500 for adapter,
/// auth, and everything else.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!("Translation failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
