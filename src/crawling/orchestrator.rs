//! Search orchestrator
//!
//! Drives one [`SearchJob`] through planning, fetching, enrichment,
//! aggregation and persistence. Only planning can fail the job; every later
//! stage degrades to fewer products instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::crawling::aggregator::Aggregator;
use crate::crawling::enrichment_stage::EnrichmentStage;
use crate::crawling::fetch_stage::{FetchStage, WindowOutcome};
use crate::crawling::persistence_sink::{PersistReport, PersistenceSink};
use crate::crawling::planner::{PaginationPlanner, PlanError};
use crate::crawling::search_cache::SearchCache;
use crate::crawling::sold_probe::SoldProbe;
use crate::crawling::state::{ConcurrencyLimits, JobCounters, JobStats};
use crate::domain::{
    EnrichedProduct, InvalidTransition, JobFailure, JobState, PlanRequest, SearchJob, SearchPlan,
};
use crate::infrastructure::MarketplaceClient;
use crate::infrastructure::config::PipelineConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error(transparent)]
    NoResults(#[from] PlanError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Tuning knobs the orchestrator reads from [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: u64,
    pub fetch_concurrency: usize,
    pub enrichment_concurrency: usize,
    pub enrichment_delay: Duration,
    pub global_max_in_flight: Option<usize>,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub use_item_api: bool,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            fetch_concurrency: config.fetch_concurrency,
            enrichment_concurrency: config.enrichment_concurrency,
            enrichment_delay: config.enrichment_delay(),
            global_max_in_flight: config.global_max_in_flight,
            cache_capacity: config.cache_capacity,
            cache_ttl: config.cache_ttl(),
            use_item_api: config.use_item_api,
        }
    }
}

/// Everything a finished job hands back to its caller
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub job_id: Uuid,
    pub term: String,
    pub plan: SearchPlan,
    pub products: Vec<EnrichedProduct>,
    /// `None` when nothing was written (empty result, no store, or failure)
    pub persisted: Option<PersistReport>,
    pub stats: JobStats,
}

impl SearchOutcome {
    #[must_use]
    pub const fn db_saved(&self) -> bool {
        self.persisted.is_some()
    }
}

pub struct SearchOrchestrator {
    planner: PaginationPlanner,
    fetch_stage: Arc<FetchStage>,
    enrichment: EnrichmentStage,
    sink: Option<PersistenceSink>,
    settings: PipelineSettings,
    global_limit: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("settings", &self.settings)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl SearchOrchestrator {
    #[must_use]
    pub fn new(client: MarketplaceClient, sink: Option<PersistenceSink>, settings: PipelineSettings) -> Self {
        let planner = PaginationPlanner::new(client.clone(), settings.batch_size);
        let cache = SearchCache::new(settings.cache_capacity, settings.cache_ttl);
        let fetch_stage = Arc::new(FetchStage::new(client.clone(), cache));
        let probe = Arc::new(SoldProbe::new(client, settings.use_item_api));
        let enrichment = EnrichmentStage::new(probe, settings.enrichment_delay);
        let global_limit = settings
            .global_max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        Self {
            planner,
            fetch_stage,
            enrichment,
            sink,
            settings,
            global_limit,
        }
    }

    /// Replaces the standard probe chain
    #[must_use]
    pub fn with_probe(mut self, probe: SoldProbe) -> Self {
        self.enrichment = EnrichmentStage::new(Arc::new(probe), self.settings.enrichment_delay);
        self
    }

    #[must_use]
    pub fn sink(&self) -> Option<&PersistenceSink> {
        self.sink.as_ref()
    }

    pub async fn run(&self, term: &str, request: &PlanRequest) -> Result<SearchOutcome, OrchestratorError> {
        let mut job = SearchJob::new(term);
        let span = info_span!("search_job", job_id = %job.id(), term);
        self.run_job(&mut job, request).instrument(span).await
    }

    async fn run_job(&self, job: &mut SearchJob, request: &PlanRequest) -> Result<SearchOutcome, OrchestratorError> {
        let started = Instant::now();
        let term = job.term().to_string();

        let plan = match self.planner.plan(&term, request).await {
            Ok(plan) => plan,
            Err(e) => {
                job.fail(JobFailure::NoResults)?;
                return Err(e.into());
            }
        };
        job.start_fetching(plan.clone())?;

        let limits = ConcurrencyLimits::new(
            self.settings.fetch_concurrency,
            self.settings.enrichment_concurrency,
            self.global_limit.clone(),
        );
        let counters = Arc::new(JobCounters::default());
        let aggregator = Aggregator::new();

        let mut fetches = JoinSet::new();
        for window in plan.windows.iter().copied() {
            let stage = Arc::clone(&self.fetch_stage);
            let limiter = limits.fetch.clone();
            let counters = Arc::clone(&counters);
            let term = term.clone();
            fetches.spawn(
                async move { stage.fetch_window(&term, window, &limiter, &counters).await }
                    .in_current_span(),
            );
        }

        // Enrichment for a window starts as soon as that window is decoded
        let mut enrichments = JoinSet::new();
        let mut drafts_spawned = 0usize;
        while let Some(joined) = fetches.join_next().await {
            let WindowOutcome { drafts, .. } = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Fetch task aborted");
                    JobCounters::incr(&counters.windows_failed);
                    continue;
                }
            };
            drafts_spawned += drafts.len();
            for draft in drafts {
                let stage = self.enrichment.clone();
                let limiter = limits.enrich.clone();
                let counters = Arc::clone(&counters);
                let aggregator = aggregator.clone();
                enrichments.spawn(
                    async move {
                        let product = stage.enrich(draft, &limiter, &counters).await;
                        aggregator.push(product).await;
                    }
                    .in_current_span(),
                );
            }
        }
        job.advance(JobState::Enriching)?;

        while let Some(joined) = enrichments.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Enrichment task aborted");
            }
        }
        job.advance(JobState::Aggregating)?;

        let products = aggregator.drain().await;
        if products.len() != drafts_spawned {
            error!(
                expected = drafts_spawned,
                aggregated = products.len(),
                "Aggregated product count does not match decoded drafts"
            );
        }
        job.advance(JobState::Persisting)?;

        let persisted = self.persist(&products).await;
        job.advance(JobState::Done)?;

        let stats = counters.snapshot(&limits, elapsed_ms(started));
        info!(
            products = products.len(),
            db_saved = persisted.is_some(),
            elapsed_ms = stats.elapsed_ms,
            peak_fetch_in_flight = stats.peak_fetch_in_flight,
            peak_enrich_in_flight = stats.peak_enrich_in_flight,
            "Search job finished"
        );

        Ok(SearchOutcome {
            job_id: job.id(),
            term,
            plan,
            products,
            persisted,
            stats,
        })
    }

    async fn persist(&self, products: &[EnrichedProduct]) -> Option<PersistReport> {
        if products.is_empty() {
            return None;
        }
        let Some(sink) = &self.sink else {
            warn!("No product store configured, skipping persistence");
            return None;
        };
        match sink.persist(products).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Persistence failed, returning in-memory results only");
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
