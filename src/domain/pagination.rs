//! Pagination domain logic.
//!
//! Responsibility:
//! - capping the upstream-reported total at the processing ceiling
//! - partitioning an offset range into contiguous windows
//! - translating the optional `offset` / `limit` / `num_batches` request fields

use serde::Serialize;

/// Hard ceiling on listings processed per search
pub const MAX_RESULTS: u64 = 2000;

/// A contiguous offset/limit slice of the upstream paginated results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub offset: u64,
    pub size: u64,
}

impl Window {
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Optional shaping of the range requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanRequest {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub num_batches: Option<u64>,
}

/// Output of the pagination planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPlan {
    pub reported_total: u64,
    pub capped_total: u64,
    pub window_size: u64,
    pub windows: Vec<Window>,
}

impl SearchPlan {
    /// Builds the plan for a reported total, honoring the request shaping
    #[must_use]
    pub fn build(reported_total: u64, batch_size: u64, request: &PlanRequest) -> Self {
        let capped_total = cap_total(reported_total);
        let batch_size = batch_size.max(1);

        let start = request.offset.unwrap_or(0).min(capped_total);
        let end = match request.limit {
            Some(limit) => start.saturating_add(limit).min(capped_total),
            None => capped_total,
        };
        let span = end - start;

        let window_size = match request.num_batches {
            Some(batches) if batches > 0 => span.div_ceil(batches).clamp(1, batch_size),
            _ => batch_size,
        };

        Self {
            reported_total,
            capped_total,
            window_size,
            windows: partition(start, end, window_size),
        }
    }

    /// Upper bound on drafts this plan can produce
    #[must_use]
    pub fn planned_items(&self) -> u64 {
        self.windows.iter().map(|w| w.size).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[must_use]
pub fn cap_total(reported_total: u64) -> u64 {
    reported_total.min(MAX_RESULTS)
}

/// Splits `[start, end)` into windows of `size`; the last one may be shorter
#[must_use]
pub fn partition(start: u64, end: u64, size: u64) -> Vec<Window> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut offset = start;
    while offset < end {
        let len = size.min(end - offset);
        windows.push(Window::new(offset, len));
        offset += len;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn laptop_scenario_yields_three_windows() {
        let plan = SearchPlan::build(120, 50, &PlanRequest::default());

        assert_eq!(plan.capped_total, 120);
        assert_eq!(
            plan.windows,
            vec![Window::new(0, 50), Window::new(50, 50), Window::new(100, 20)]
        );
    }

    #[test]
    fn total_is_capped_at_ceiling() {
        let plan = SearchPlan::build(1_000_000, 50, &PlanRequest::default());

        assert_eq!(plan.capped_total, MAX_RESULTS);
        assert_eq!(plan.windows.len(), 40);
        assert_eq!(plan.planned_items(), MAX_RESULTS);
    }

    #[test]
    fn explicit_limit_and_batches_shape_the_range() {
        let request = PlanRequest {
            offset: Some(10),
            limit: Some(50),
            num_batches: Some(2),
        };
        let plan = SearchPlan::build(500, 50, &request);

        assert_eq!(plan.window_size, 25);
        assert_eq!(plan.windows, vec![Window::new(10, 25), Window::new(35, 25)]);
    }

    #[test]
    fn window_size_never_exceeds_batch_size() {
        let request = PlanRequest {
            offset: None,
            limit: Some(300),
            num_batches: Some(2),
        };
        let plan = SearchPlan::build(1000, 50, &request);

        assert_eq!(plan.window_size, 50);
        assert_eq!(plan.windows.len(), 6);
    }

    #[test]
    fn offset_past_total_gives_empty_plan() {
        let request = PlanRequest {
            offset: Some(5000),
            ..PlanRequest::default()
        };
        let plan = SearchPlan::build(120, 50, &request);

        assert!(plan.is_empty());
        assert_eq!(plan.planned_items(), 0);
    }

    proptest! {
        #[test]
        fn windows_tile_the_capped_range(total in 0u64..10_000, batch in 1u64..200) {
            let plan = SearchPlan::build(total, batch, &PlanRequest::default());
            let capped = total.min(MAX_RESULTS);

            prop_assert_eq!(plan.planned_items(), capped);
            let mut expected_offset = 0;
            for window in &plan.windows {
                prop_assert_eq!(window.offset, expected_offset);
                prop_assert!(window.size >= 1 && window.size <= batch);
                expected_offset = window.end();
            }
            prop_assert_eq!(expected_offset, capped);
        }
    }
}
