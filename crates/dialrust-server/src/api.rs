//! HTTP surface: health check and manual tick trigger

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dialrust_core::{Dialer, DialerError, TickReport};
use dialrust_storage::HealthCheck;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Something that can run a dialer tick on demand
#[async_trait]
pub trait TickTrigger: Send + Sync {
    async fn try_tick(&self, now: DateTime<Utc>) -> Option<Result<TickReport, DialerError>>;
}

#[async_trait]
impl TickTrigger for Dialer {
    async fn try_tick(&self, now: DateTime<Utc>) -> Option<Result<TickReport, DialerError>> {
        Dialer::try_tick(self, now).await
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<dyn TickTrigger>,
    pub health: Arc<dyn HealthCheck>,
    /// Bearer token required by the tick endpoint, when set
    pub trigger_token: Option<String>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/dialer/tick", post(trigger_tick))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.health.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn trigger_tick(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(expected) = &state.trigger_token {
        if bearer_token(&headers) != Some(expected.as_str()) {
            warn!("Rejected tick trigger with missing or invalid token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid trigger token" })),
            )
                .into_response();
        }
    }

    match state.trigger.try_tick(Utc::now()).await {
        Some(Ok(report)) => {
            report.log();
            (StatusCode::OK, Json(report)).into_response()
        }
        Some(Err(e)) => {
            error!(error = %e, "Triggered tick failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a tick is already running" })),
        )
            .into_response(),
    }
}
