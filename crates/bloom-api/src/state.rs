//! Application state shared across handlers

use bloom_auth::AuthService;
use bloom_db::Database;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Authentication orchestrator
    pub auth: Arc<AuthService>,
    /// Connection pools, absent when running on in-memory stores
    pub db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, db: Option<Arc<Database>>) -> Self {
        Self { auth, db }
    }
}
