//! Repository implementations

mod user;

pub use user::{UserRepo, UserStore};
