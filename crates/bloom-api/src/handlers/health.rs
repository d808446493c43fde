//! Health Check Handlers
//!
//! Endpoints for service health monitoring.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Timestamp (Unix milliseconds)
    pub timestamp: i64,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResponse {
    /// `ready` or `not_ready`
    pub status: String,
    pub database: ComponentStatus,
    pub redis: ComponentStatus,
}

/// Component status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    pub name: String,
    /// `healthy`, `unhealthy` or `in_memory`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentStatus {
    fn new(name: &str, healthy: bool) -> Self {
        Self {
            name: name.to_string(),
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            error: (!healthy).then(|| format!("{} health check failed", name)),
        }
    }

    fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "in_memory".to_string(),
            error: None,
        }
    }

    fn is_up(&self) -> bool {
        self.status != "unhealthy"
    }
}

/// Health check endpoint
///
/// Returns 200 if the service is running.
/// This is a lightweight check that doesn't verify dependencies.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

/// Readiness check endpoint
///
/// Returns 200 if PostgreSQL and Redis are reachable.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service is not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let (database, redis) = match &state.db {
        Some(db) => {
            let health = db.health_check().await;
            (
                ComponentStatus::new("PostgreSQL", health.postgres),
                ComponentStatus::new("Redis", health.redis),
            )
        }
        None => {
            let kv_connected = state.auth.cache().stats().await.kv_connected;
            let redis = if kv_connected {
                ComponentStatus::in_memory("Redis")
            } else {
                ComponentStatus::new("Redis", false)
            };
            (ComponentStatus::in_memory("PostgreSQL"), redis)
        }
    };

    let ready = database.is_up() && redis.is_up();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            database,
            redis,
        }),
    )
}
