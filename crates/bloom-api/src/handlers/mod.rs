//! API Handlers
//!
//! Request handlers for all API endpoints.
//! Each module handles a specific domain.

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;
