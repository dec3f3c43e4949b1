//! Pagination planner
//!
//! One `limit=1` probe learns the reported total; the rest is pure
//! arithmetic in [`SearchPlan::build`].

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{PlanRequest, SearchPlan};
use crate::infrastructure::MarketplaceClient;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("No results for '{term}': {reason}")]
    NoResults { term: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct PaginationPlanner {
    client: MarketplaceClient,
    batch_size: u64,
}

impl PaginationPlanner {
    #[must_use]
    pub fn new(client: MarketplaceClient, batch_size: u64) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn plan(&self, term: &str, request: &PlanRequest) -> Result<SearchPlan, PlanError> {
        let no_results = |reason: String| {
            warn!(term, %reason, "Planning found nothing to fetch");
            PlanError::NoResults {
                term: term.to_string(),
                reason,
            }
        };

        let probe = self
            .client
            .search(term, 0, 1)
            .await
            .map_err(|e| no_results(e.to_string()))?;

        if probe.total == 0 {
            return Err(no_results("upstream reported zero matches".to_string()));
        }

        let plan = SearchPlan::build(probe.total, self.batch_size, request);
        info!(
            term,
            reported_total = plan.reported_total,
            capped_total = plan.capped_total,
            window_size = plan.window_size,
            windows = plan.windows.len(),
            "Search planned"
        );
        Ok(plan)
    }
}
