//! API Integration Tests
//!
//! Drives the full router against the in-memory user and key-value stores,
//! covering the request/response cycle of every endpoint group.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bloom_auth::config::PasswordConfig;
use bloom_auth::telegram::miniapp_hash;
use bloom_auth::{AuthConfig, AuthService, LogNotifier, PasswordService};
use bloom_db::memory::{MemoryKvStore, MemoryUserStore};
use bloom_db::{NewUser, UserRole, UserStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

use bloom_api::{create_test_router, AppState};

const BOT_TOKEN: &str = "7001:integration-bot-token";
const SECRET: &str = "integration-secret-integration-secret!";

struct TestApp {
    router: Router,
    users: Arc<MemoryUserStore>,
    kv: Arc<MemoryKvStore>,
    auth: Arc<AuthService>,
    passwords: PasswordService,
}

fn auth_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.jwt.secret = SECRET.to_string();
    config.password = PasswordConfig {
        memory_cost: 4096,
        time_cost: 1,
        ..Default::default()
    };
    config.telegram.bot_token = Some(BOT_TOKEN.to_string());
    // Requests carry their client address in X-Forwarded-For, as behind a proxy
    config.rate_limit.trust_forwarded_headers = true;
    config
}

fn test_app() -> TestApp {
    let users = Arc::new(MemoryUserStore::new());
    let kv = Arc::new(MemoryKvStore::new());
    let config = auth_config();
    let passwords = PasswordService::new(config.password.clone());
    let auth = Arc::new(AuthService::new(config, users.clone(), kv.clone(), Arc::new(LogNotifier)).unwrap());
    let router = create_test_router(Arc::new(AppState::new(auth.clone(), None)));

    TestApp {
        router,
        users,
        kv,
        auth,
        passwords,
    }
}

impl TestApp {
    async fn user(&self, email: &str, password: &str, role: UserRole) -> i64 {
        self.users
            .create(NewUser {
                email: email.to_string(),
                hashed_password: Some(self.passwords.hash_password(password).unwrap()),
                full_name: Some("Test User".to_string()),
                role,
                is_active: true,
                is_verified: true,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn login(&self, email: &str, password: &str, ip: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
                ip,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
        ip: &str,
    ) -> (StatusCode, Value) {
        let (status, _, json) = json_request(&self.router, method, uri, body, bearer, ip).await;
        (status, json)
    }

    async fn subject_of(&self, token: &str) -> i64 {
        let claims = self.auth.tokens().decode(token).await.unwrap();
        claims.sub.parse().unwrap()
    }
}

/// Test helper to make a request and get the JSON response
async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
    ip: &str,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("X-Forwarded-For", ip);

    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(json_body) => Body::from(serde_json::to_vec(&json_body).unwrap()),
        None => Body::empty(),
    };

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));

    (status, headers, json)
}

/// Signed Mini-App `initData` for a Telegram user
fn init_data(telegram_id: i64, first_name: &str) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("auth_date".to_string(), chrono::Utc::now().timestamp().to_string());
    fields.insert("query_id".to_string(), "AAHdF6IQAAAAAN0XohDhrOrc".to_string());
    fields.insert(
        "user".to_string(),
        json!({ "id": telegram_id, "first_name": first_name, "language_code": "en" }).to_string(),
    );
    let hash = miniapp_hash(&fields, BOT_TOKEN).unwrap();
    fields.insert("hash".to_string(), hash);

    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_new_miniapp_user_is_created_verified() {
        let app = test_app();

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/telegram-miniapp",
                Some(json!({ "init_data": init_data(555_000_111, "Mila") })),
                None,
                "198.51.100.20",
            )
            .await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["is_new_user"], true);
        assert_eq!(body["auth_method"], "miniapp");
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["user"]["is_verified"], true);
        assert_eq!(body["user"]["email"], "telegram_555000111@telegram.local");
        assert_eq!(body["user"]["role"], "client");

        let user_id = body["user"]["id"].as_i64().unwrap();
        assert_eq!(app.subject_of(body["access_token"].as_str().unwrap()).await, user_id);
        assert_eq!(app.subject_of(body["refresh_token"].as_str().unwrap()).await, user_id);

        let stored = app.users.find_by_telegram_id(555_000_111).await.unwrap().unwrap();
        assert_eq!(stored.id, user_id);
        assert!(stored.is_verified);
    }

    #[tokio::test]
    async fn test_sixth_failed_login_is_rate_limited() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let ip = "203.0.113.50";

        for attempt in 1..=5 {
            let (status, body) = app
                .request(
                    "POST",
                    "/api/v1/auth/login",
                    Some(json!({ "email": "rose@example.com", "password": "wrong-password" })),
                    None,
                    ip,
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {}", attempt);
            assert_eq!(body["code"], "invalid_credentials");
        }

        // The correct password is refused too: the limit applies before verification
        let (status, headers, body) = json_request(
            &app.router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "rose@example.com", "password": "Tulips4ever" })),
            None,
            ip,
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "rate_limited");
        let retry_after: u64 = headers["Retry-After"].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 0 && retry_after <= 300);
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        assert_eq!(body["retry_after"], retry_after);

        // Another client is unaffected
        app.login("rose@example.com", "Tulips4ever", "203.0.113.51").await;
    }

    #[tokio::test]
    async fn test_logout_revokes_access_token_only() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.30").await;
        let access = session["access_token"].as_str().unwrap();
        let refresh = session["refresh_token"].as_str().unwrap();

        let (status, _) = app.request("GET", "/api/v1/users/me", None, Some(access), "192.0.2.30").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .request("POST", "/api/v1/auth/logout", None, Some(access), "192.0.2.30")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = app.request("GET", "/api/v1/users/me", None, Some(access), "192.0.2.30").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_token");

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/refresh",
                Some(json!({ "refresh_token": refresh })),
                None,
                "192.0.2.30",
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["access_token"].as_str().is_some());
    }
}

// =============================================================================
// Authentication endpoints
// =============================================================================

mod auth_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_returning_miniapp_user() {
        let app = test_app();
        let payload = json!({ "init_data": init_data(42, "Ada") });

        let (_, first) = app
            .request("POST", "/api/v1/auth/telegram-miniapp", Some(payload.clone()), None, "192.0.2.1")
            .await;
        let (status, second) = app
            .request("POST", "/api/v1/auth/telegram-miniapp", Some(payload), None, "192.0.2.2")
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["is_new_user"], false);
        assert_eq!(second["user"]["id"], first["user"]["id"]);
    }

    #[tokio::test]
    async fn test_tampered_miniapp_payload() {
        let app = test_app();
        let tampered = init_data(42, "Ada").replace("Ada", "Eve");

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/telegram-miniapp",
                Some(json!({ "init_data": tampered })),
                None,
                "192.0.2.1",
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_signature");
        assert!(app.users.is_empty());
    }

    #[tokio::test]
    async fn test_stale_website_payload() {
        let app = test_app();
        let mut payload = bloom_auth::telegram::TelegramWidgetPayload {
            id: 9,
            first_name: "Iris".to_string(),
            last_name: None,
            username: None,
            photo_url: None,
            auth_date: chrono::Utc::now().timestamp() - 86_401,
            hash: String::new(),
        };
        payload.hash = bloom_auth::telegram::website_hash(&payload, BOT_TOKEN).unwrap();

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/telegram-website",
                Some(serde_json::to_value(&payload).unwrap()),
                None,
                "192.0.2.1",
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "stale_assertion");

        payload.auth_date = chrono::Utc::now().timestamp() - 30;
        payload.hash = bloom_auth::telegram::website_hash(&payload, BOT_TOKEN).unwrap();
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/telegram-website",
                Some(serde_json::to_value(&payload).unwrap()),
                None,
                "192.0.2.1",
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["auth_method"], "website");
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let app = test_app();
        let request = json!({ "email": "new@example.com", "password": "Peonies2024", "full_name": "Nia" });

        let (status, body) = app
            .request("POST", "/api/v1/auth/register", Some(request.clone()), None, "192.0.2.5")
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["user"]["full_name"], "Nia");

        let (status, body) = app
            .request("POST", "/api/v1/auth/register", Some(request), None, "192.0.2.5")
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "email_taken");
    }

    #[tokio::test]
    async fn test_invalid_request_body() {
        let app = test_app();
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/login",
                Some(json!({ "email": "not-an-email", "password": "x" })),
                None,
                "192.0.2.5",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.6").await;

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/refresh",
                Some(json!({ "refresh_token": session["access_token"] })),
                None,
                "192.0.2.6",
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_token");
    }

    #[tokio::test]
    async fn test_logout_all_devices_and_idempotence() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let phone = app.login("rose@example.com", "Tulips4ever", "192.0.2.7").await;
        let laptop = app.login("rose@example.com", "Tulips4ever", "192.0.2.8").await;
        let phone_access = phone["access_token"].as_str().unwrap();

        let (status, _) = app
            .request(
                "POST",
                "/api/v1/auth/logout",
                Some(json!({ "all_devices": true })),
                Some(phone_access),
                "192.0.2.7",
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        // Repeating the logout still succeeds
        let (status, _) = app
            .request("POST", "/api/v1/auth/logout", None, Some(phone_access), "192.0.2.7")
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request("GET", "/api/v1/users/me", None, laptop["access_token"].as_str(), "192.0.2.8")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_fails_closed_when_store_is_down() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.9").await;

        app.kv.set_unavailable(true);
        let (status, body) = app
            .request("POST", "/api/v1/auth/logout", None, session["access_token"].as_str(), "192.0.2.9")
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "dependency_unavailable");
    }
}

// =============================================================================
// User endpoints
// =============================================================================

mod user_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_missing_token() {
        let app = test_app();
        let (status, body) = app.request("GET", "/api/v1/users/me", None, None, "192.0.2.10").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_token");
    }

    #[tokio::test]
    async fn test_update_profile_is_visible_immediately() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.11").await;
        let access = session["access_token"].as_str();

        // Prime the identity cache
        app.request("GET", "/api/v1/users/me", None, access, "192.0.2.11").await;

        let (status, body) = app
            .request(
                "PATCH",
                "/api/v1/users/me",
                Some(json!({ "full_name": "Rosa Bloom", "address": "12 Garden Lane" })),
                access,
                "192.0.2.11",
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let (_, body) = app.request("GET", "/api/v1/users/me", None, access, "192.0.2.11").await;
        assert_eq!(body["full_name"], "Rosa Bloom");
        assert_eq!(body["address"], "12 Garden Lane");
    }

    #[tokio::test]
    async fn test_rate_limit_headers_on_user_routes() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.12").await;

        let (status, headers, _) = json_request(
            &app.router,
            "GET",
            "/api/v1/users/me",
            None,
            session["access_token"].as_str(),
            "192.0.2.12",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["X-RateLimit-Limit"], "100");
        assert_eq!(headers["X-RateLimit-Remaining"], "99");
    }
}

// =============================================================================
// Admin endpoints
// =============================================================================

mod admin_endpoints {
    use super::*;

    async fn admin_token(app: &TestApp) -> String {
        app.user("admin@example.com", "Orchids4ever", UserRole::Admin).await;
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/admin-login",
                Some(json!({ "email": "admin@example.com", "password": "Orchids4ever" })),
                None,
                "10.0.0.1",
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admin_login_refuses_clients() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/auth/admin-login",
                Some(json!({ "email": "rose@example.com", "password": "Tulips4ever" })),
                None,
                "192.0.2.13",
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.14").await;

        let (status, _) = app
            .request("GET", "/api/v1/admin/cache/stats", None, session["access_token"].as_str(), "192.0.2.14")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cache_stats_and_clear() {
        let app = test_app();
        let token = admin_token(&app).await;

        // Authenticating caches the admin's own identity
        let (status, body) = app
            .request("GET", "/api/v1/admin/cache/stats", None, Some(&token), "10.0.0.1")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached_users"], 1);
        assert_eq!(body["key_prefix"], "user_cache:");

        let (status, body) = app
            .request("DELETE", "/api/v1/admin/cache", None, Some(&token), "10.0.0.1")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);
    }

    #[tokio::test]
    async fn test_rate_limit_status_and_clear() {
        let app = test_app();
        app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        for _ in 0..2 {
            app.request(
                "POST",
                "/api/v1/auth/login",
                Some(json!({ "email": "rose@example.com", "password": "wrong-password" })),
                None,
                "203.0.113.77",
            )
            .await;
        }
        let token = admin_token(&app).await;
        let uri = "/api/v1/admin/rate-limits/auth_login:ip:203.0.113.77";

        let (status, body) = app.request("GET", uri, None, Some(&token), "10.0.0.1").await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["count"], 2);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["remaining"], 3);

        let (status, body) = app.request("DELETE", uri, None, Some(&token), "10.0.0.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], true);

        let (_, body) = app.request("GET", uri, None, Some(&token), "10.0.0.1").await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_revoke_user_sessions() {
        let app = test_app();
        let user_id = app.user("rose@example.com", "Tulips4ever", UserRole::Client).await;
        let session = app.login("rose@example.com", "Tulips4ever", "192.0.2.15").await;
        let token = admin_token(&app).await;

        let (status, body) = app
            .request(
                "POST",
                &format!("/api/v1/admin/users/{}/revoke", user_id),
                None,
                Some(&token),
                "10.0.0.1",
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revoked"], true);

        let (status, _) = app
            .request("GET", "/api/v1/users/me", None, session["access_token"].as_str(), "192.0.2.15")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .request(
                "POST",
                "/api/v1/auth/refresh",
                Some(json!({ "refresh_token": session["refresh_token"] })),
                None,
                "192.0.2.15",
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Health endpoints
// =============================================================================

mod health_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.request("GET", "/health", None, None, "192.0.2.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_follows_kv_store() {
        let app = test_app();
        let (status, body) = app.request("GET", "/ready", None, None, "192.0.2.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        app.kv.set_unavailable(true);
        let (status, body) = app.request("GET", "/ready", None, None, "192.0.2.1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["redis"]["status"], "unhealthy");
    }
}
