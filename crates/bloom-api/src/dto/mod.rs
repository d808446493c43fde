//! Data Transfer Objects
//!
//! Request and response structures for the API.

pub mod admin;
pub mod auth;
pub mod user;

pub use admin::*;
pub use auth::*;
pub use user::*;
