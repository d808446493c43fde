//! API Middleware

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use bloom_auth::rate_limit::{ip_identifier, names};
use std::sync::Arc;

use crate::error::ApiError;
use crate::extractors::ClientIp;
use crate::state::AppState;

async fn enforce_limit(state: &AppState, name: &str, ip: &str, req: Request, next: Next) -> Response {
    let info = match state.auth.limiter().check(name, &ip_identifier(ip)).await {
        Ok(info) => info,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let mut response = next.run(req).await;
    if !info.degraded {
        let headers = response.headers_mut();
        for (name, value) in info.to_headers() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        }
    }
    response
}

/// Per-IP `api_general` limit for authenticated user routes
pub async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    enforce_limit(&state, names::API_GENERAL, &ip, req, next).await
}

/// Per-IP `admin_actions` limit for the admin routes
pub async fn admin_rate_limit(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    enforce_limit(&state, names::ADMIN_ACTIONS, &ip, req, next).await
}

/// Security headers middleware
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    // Token responses must never be cached
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));

    response
}
