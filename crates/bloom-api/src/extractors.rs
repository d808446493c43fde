//! Custom Axum Extractors
//!
//! Request extractors for authentication, client identification, and validation.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    Json,
};
use bloom_auth::rate_limit::extract_client_ip;
use bloom_auth::{AuthError, CurrentUser};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Bearer Token Extractor
// =============================================================================

/// Raw token from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .map(|token| BearerToken(token.to_string()))
            .ok_or_else(|| ApiError::MissingToken.into_response())
    }
}

// =============================================================================
// Authenticated User Extractor
// =============================================================================

/// Caller resolved from a valid, unrevoked access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let app = Arc::<AppState>::from_ref(state);

        app.auth
            .authenticate(&token)
            .await
            .map(AuthenticatedUser)
            .map_err(|e| ApiError::from(e).into_response())
    }
}

// =============================================================================
// Admin Required Extractor
// =============================================================================

/// Extractor that requires the admin role
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            tracing::warn!(user_id = user.id, "Admin endpoint refused");
            return Err(ApiError::from(AuthError::Forbidden).into_response());
        }

        Ok(RequireAdmin(user))
    }
}

// =============================================================================
// Validated JSON Extractor
// =============================================================================

/// JSON extractor with validation
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> axum::extract::FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + validator::Validate,
{
    type Rejection = Response;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()).into_response())?;

        value.validate().map_err(|e| ApiError::from(e).into_response())?;

        Ok(ValidatedJson(value))
    }
}

// =============================================================================
// Client IP Extractor
// =============================================================================

/// Client address used for per-IP rate limits
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = Arc::<AppState>::from_ref(state);
        let trust_forwarded = app.auth.config().rate_limit.trust_forwarded_headers;
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientIp(extract_client_ip(&parts.headers, peer, trust_forwarded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(parse_bearer("bearer  abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic dXNlcg=="), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Bearer"), None);
    }

    fn state(trust_forwarded_headers: bool) -> Arc<AppState> {
        let mut config = bloom_auth::AuthConfig::default();
        config.jwt.secret = "extractor-test-secret-extractor-test".to_string();
        config.rate_limit.trust_forwarded_headers = trust_forwarded_headers;
        let auth = bloom_auth::AuthService::new(
            config,
            Arc::new(bloom_db::memory::MemoryUserStore::new()),
            Arc::new(bloom_db::memory::MemoryKvStore::new()),
            Arc::new(bloom_auth::LogNotifier),
        )
        .unwrap();
        Arc::new(AppState::new(Arc::new(auth), None))
    }

    fn forwarded_parts() -> Parts {
        let request = axum::http::Request::builder()
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        parts
    }

    #[tokio::test]
    async fn test_client_ip_prefers_forwarded_header_when_trusted() {
        let mut parts = forwarded_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &state(true)).await.unwrap();
        assert_eq!(ip, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_client_ip_ignores_spoofed_header_by_default() {
        let mut parts = forwarded_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &state(false)).await.unwrap();
        assert_eq!(ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_client_ip_falls_back_to_peer() {
        let (mut parts, _) = axum::http::Request::builder().body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 4000))));

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &state(true)).await.unwrap();
        assert_eq!(ip, "192.0.2.4");
    }
}
