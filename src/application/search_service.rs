//! Search service
//!
//! Use cases behind the HTTP routes: run a search, export posted products,
//! export stored products matching a term.

use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::dto::{DownloadRequest, SearchRequest, SearchResponse};
use crate::crawling::{OrchestratorError, SearchOrchestrator};
use crate::domain::EnrichedProduct;
use crate::infrastructure::{ExportError, ProductStore, export_products};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Error generando archivo Excel")]
    Export(#[from] ExportError),

    #[error("No se pudo consultar la base de datos")]
    Store(String),

    #[error("Error interno del servidor")]
    Internal(String),
}

impl ServiceError {
    /// Extra detail for 5xx bodies
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Export(e) => Some(e.to_string()),
            Self::Store(details) | Self::Internal(details) => Some(details.clone()),
            Self::InvalidRequest(_) | Self::NotFound(_) => None,
        }
    }
}

/// Generated spreadsheet plus its download name
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct SearchService {
    orchestrator: Arc<SearchOrchestrator>,
    store: Option<Arc<dyn ProductStore>>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("orchestrator", &self.orchestrator)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl SearchService {
    #[must_use]
    pub fn new(orchestrator: Arc<SearchOrchestrator>, store: Option<Arc<dyn ProductStore>>) -> Self {
        Self { orchestrator, store }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ServiceError> {
        let Some(term) = request.term() else {
            warn!("Search request without a term");
            return Err(ServiceError::InvalidRequest(
                "Datos del producto no proporcionados".to_string(),
            ));
        };

        let outcome = match self.orchestrator.run(term, &request.plan_request()).await {
            Ok(outcome) => outcome,
            Err(OrchestratorError::NoResults(e)) => {
                info!(term, reason = %e, "Search returned no results");
                return Err(no_products_found());
            }
            Err(e @ OrchestratorError::InvalidTransition(_)) => {
                error!(term, error = %e, "Search job state machine violated");
                return Err(ServiceError::Internal(e.to_string()));
            }
        };

        if outcome.products.is_empty() {
            warn!(term, job_id = %outcome.job_id, "Search produced no products");
            return Err(no_products_found());
        }

        let db_saved = outcome.db_saved();
        let total = outcome.products.len();
        Ok(SearchResponse {
            success: true,
            data: outcome.products,
            total,
            db_saved,
        })
    }

    /// Exports the products posted by the client
    pub async fn export_products(&self, request: DownloadRequest) -> Result<ExportFile, ServiceError> {
        let products = match request.productos {
            Some(products) if !products.is_empty() => products,
            _ => {
                return Err(ServiceError::InvalidRequest(
                    "No se proporcionaron datos de productos".to_string(),
                ));
            }
        };

        let bytes = render(products).await?;
        Ok(ExportFile {
            filename: format!(
                "productos_mercadolibre_{}.xlsx",
                Local::now().format("%Y%m%d_%H%M%S")
            ),
            bytes,
        })
    }

    /// Exports stored products whose title contains `term`
    pub async fn export_stored(&self, term: Option<&str>) -> Result<ExportFile, ServiceError> {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return Err(ServiceError::InvalidRequest(
                "Falta el parámetro de producto".to_string(),
            ));
        };
        let Some(store) = &self.store else {
            return Err(ServiceError::Store("no product store configured".to_string()));
        };

        let products = store.find_by_title(term).await.map_err(|e| {
            error!(term, error = %e, "Stored product lookup failed");
            ServiceError::Store(e.to_string())
        })?;
        if products.is_empty() {
            return Err(ServiceError::NotFound("No se encontraron productos".to_string()));
        }

        info!(term, products = products.len(), "Exporting stored products");
        let bytes = render(products).await?;
        Ok(ExportFile {
            filename: format!(
                "productos_{}_{}.xlsx",
                filename_component(term),
                Local::now().format("%Y%m%d")
            ),
            bytes,
        })
    }
}

fn no_products_found() -> ServiceError {
    ServiceError::NotFound(
        "No se encontraron productos o ocurrió un error en la búsqueda".to_string(),
    )
}

/// Workbook generation is CPU-bound; keep it off the async workers
async fn render(products: Vec<EnrichedProduct>) -> Result<Vec<u8>, ServiceError> {
    tokio::task::spawn_blocking(move || export_products(&products))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, "Spreadsheet generation failed");
            ServiceError::from(e)
        })
}

/// Keeps a search term safe inside a `Content-Disposition` filename
fn filename_component(term: &str) -> String {
    term.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_component_replaces_unsafe_characters() {
        assert_eq!(filename_component("laptop gamer/15\""), "laptop_gamer_15_");
        assert_eq!(filename_component("cámara"), "c_mara");
    }

    #[test]
    fn only_server_errors_carry_details() {
        assert!(ServiceError::NotFound("x".to_string()).details().is_none());
        assert_eq!(
            ServiceError::Internal("boom".to_string()).details().as_deref(),
            Some("boom")
        );
    }
}
