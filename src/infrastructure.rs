//! Infrastructure layer for configuration, logging, upstream HTTP access,
//! persistence and spreadsheet export.

pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod marketplace_api;
pub mod product_repository;
pub mod spreadsheet;

// Re-export commonly used items
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use http_client::{FetchResponse, ReqwestTransport, Transport, TransportError};
pub use marketplace_api::{MarketplaceClient, SearchPage, UpstreamError};
pub use product_repository::{ProductRepository, ProductStore, UpsertOutcome};
pub use spreadsheet::{ExportError, export_products};
