//! Data Transfer Objects for the HTTP API
//!
//! Field names follow the wire contract the browser front end already uses.

use serde::{Deserialize, Serialize};

use crate::domain::{EnrichedProduct, PlanRequest};

/// `POST /api/search` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub producto: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub num_batches: Option<u64>,
}

impl SearchRequest {
    /// Trimmed search term, `None` when missing or blank
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        self.producto
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    #[must_use]
    pub const fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            offset: self.offset,
            limit: self.limit,
            num_batches: self.num_batches,
        }
    }
}

/// `POST /api/search` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<EnrichedProduct>,
    pub total: usize,
    pub db_saved: bool,
}

/// `POST /api/download-excel` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    pub productos: Option<Vec<EnrichedProduct>>,
}

/// `GET /api/download` query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    pub producto: Option<String>,
}
