//! Search job lifecycle
//!
//! `Planning → Fetching → Enriching → Aggregating → Persisting → Done`, with
//! `Failed` reachable only from `Planning`. Every later stage is best-effort
//! and always reaches `Done`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::pagination::SearchPlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFailure {
    NoResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum JobState {
    Planning,
    Fetching,
    Enriching,
    Aggregating,
    Persisting,
    Done,
    Failed(JobFailure),
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    fn can_advance_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Planning, Self::Fetching | Self::Failed(_))
                | (Self::Fetching, Self::Enriching)
                | (Self::Enriching, Self::Aggregating)
                | (Self::Aggregating, Self::Persisting)
                | (Self::Persisting, Self::Done)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid search job transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One search request in flight. Never persisted, never shared.
#[derive(Debug, Clone)]
pub struct SearchJob {
    id: Uuid,
    term: String,
    state: JobState,
    plan: Option<SearchPlan>,
    started_at: DateTime<Utc>,
}

impl SearchJob {
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            term: term.into(),
            state: JobState::Planning,
            plan: None,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }

    #[must_use]
    pub const fn state(&self) -> &JobState {
        &self.state
    }

    #[must_use]
    pub const fn plan(&self) -> Option<&SearchPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Records the plan and moves to `Fetching`
    pub fn start_fetching(&mut self, plan: SearchPlan) -> Result<(), InvalidTransition> {
        self.advance(JobState::Fetching)?;
        self.plan = Some(plan);
        Ok(())
    }

    pub fn fail(&mut self, failure: JobFailure) -> Result<(), InvalidTransition> {
        self.advance(JobState::Failed(failure))
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(&next) {
            return Err(InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        tracing::debug!(job_id = %self.id, from = ?self.state, to = ?next, "Search job transition");
        self.state = next;
        Ok(())
    }
}
