//! Request middleware.

pub mod auth;

pub use auth::{AuthAccount, auth_middleware};
