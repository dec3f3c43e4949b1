//! Router assembly

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::routes::{download_excel, download_stored, health, search};
use crate::application::SearchService;

/// Shared handler state
#[derive(Clone, Debug)]
pub struct AppState {
    pub service: Arc<SearchService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: SearchService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/search", post(search))
        .route("/download-excel", post(download_excel))
        .route("/download", get(download_stored))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
