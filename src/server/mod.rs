use crate::error::RecError;
use crate::models::{HealthStatus, RecommendationResponse, UserId};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps library errors onto HTTP statuses at the request boundary.
#[derive(Debug)]
pub enum ApiError {
    Rec(RecError),
    Internal(String),
}

impl From<RecError> for ApiError {
    fn from(err: RecError) -> Self {
        ApiError::Rec(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Rec(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Rec(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Rec(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Rec(e) => e.to_string(),
            ApiError::Internal(message) => message.clone(),
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", message);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.serving.health())
}

async fn recommend(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(params): Query<RecommendationQuery>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let k = params.k.unwrap_or(state.config.retrieval.default_k);
    Ok(Json(state.serving.recommend(user_id, k)?))
}

async fn reload(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    let serving = state.serving.clone();
    tokio::task::spawn_blocking(move || serving.reload())
        .await
        .map_err(|e| ApiError::Internal(format!("reload task failed: {}", e)))??;
    Ok(Json(state.serving.health()))
}

async fn stats(State(state): State<AppState>) -> Json<HashMap<String, u64>> {
    Json(state.serving.stats())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rec/:user_id", get(recommend))
        .route("/reload", post(reload))
        .route("/stats", get(stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
