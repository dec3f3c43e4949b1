//! Domain module - listings, pagination plans and the search job lifecycle

pub mod pagination;
pub mod product;
pub mod search_job;

pub use pagination::{MAX_RESULTS, PlanRequest, SearchPlan, Window};
pub use product::{
    Condition, EnrichedProduct, Platform, ProductDraft, SoldCount, SoldSource,
};
pub use search_job::{InvalidTransition, JobFailure, JobState, SearchJob};
