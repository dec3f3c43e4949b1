//! product-harvest - Marketplace product harvesting service
//!
//! Searches the marketplace API concurrently, enriches each listing with its
//! units-sold count, stores the deduplicated results in SQLite and serves
//! them (plus `.xlsx` exports) over a small HTTP API.

// Module declarations
pub mod api;
pub mod application;
pub mod crawling;
pub mod domain;
pub mod infrastructure;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use api::{AppState, build_app};
pub use application::SearchService;
pub use crawling::{SearchOrchestrator, SearchOutcome};
pub use infrastructure::AppConfig;
