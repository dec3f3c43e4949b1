//! HTTP surface
//!
//! axum router, handlers and the JSON error mapping.

pub mod app;
pub mod error;
pub mod routes;

pub use app::{AppState, build_app};
pub use error::ApiError;
