//! # Search pipeline
//!
//! Planner → fetch stage → item decoder → enrichment stage → aggregator →
//! persistence sink, driven per search job by the orchestrator.
//! - Explicit module layout (no mod.rs)
//! - Each stage is independently testable against a mock transport
//! - Bounded concurrency everywhere (per-job semaphores, optional global ceiling)

pub mod aggregator;
pub mod enrichment_stage;
pub mod fetch_stage;
pub mod item_decoder;
pub mod orchestrator;
pub mod persistence_sink;
pub mod planner;
pub mod search_cache;
pub mod sold_probe;
pub mod state;

pub use aggregator::Aggregator;
pub use enrichment_stage::EnrichmentStage;
pub use fetch_stage::{FetchStage, WindowOutcome};
pub use item_decoder::{DecodeError, DecodedItem, decode_item};
pub use orchestrator::{OrchestratorError, PipelineSettings, SearchOrchestrator, SearchOutcome};
pub use persistence_sink::{PersistReport, PersistenceError, PersistenceSink};
pub use planner::{PaginationPlanner, PlanError};
pub use search_cache::SearchCache;
pub use sold_probe::{SoldProbe, SoldStrategy};
pub use state::{ConcurrencyLimits, InFlightGauge, JobCounters, JobStats, StageLimiter};
