//! Application layer module
//!
//! Request/response DTOs and the search service that the HTTP routes call.

pub mod dto;
pub mod search_service;

pub use dto::{DownloadQuery, DownloadRequest, SearchRequest, SearchResponse};
pub use search_service::{ExportFile, SearchService, ServiceError};
