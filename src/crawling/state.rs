//! # Per-job concurrency state
//!
//! Semaphore-backed stage limiters, in-flight gauges and job counters.
//! Everything here is owned by one search job except the optional global
//! semaphore, which every job shares.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Current and peak number of in-flight calls
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one call in flight until the guard drops
    pub fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct GaugeGuard(Arc<InFlightGauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounds one pipeline stage: a per-job semaphore plus the optional
/// process-wide ceiling
#[derive(Debug, Clone)]
pub struct StageLimiter {
    local: Arc<Semaphore>,
    global: Option<Arc<Semaphore>>,
    gauge: Arc<InFlightGauge>,
}

/// Held while a stage worker occupies its slot
#[derive(Debug)]
pub struct StageSlot {
    _gauge: GaugeGuard,
    _global: Option<OwnedSemaphorePermit>,
    _local: OwnedSemaphorePermit,
}

impl StageLimiter {
    #[must_use]
    pub fn new(limit: usize, global: Option<Arc<Semaphore>>) -> Self {
        Self {
            local: Arc::new(Semaphore::new(limit.max(1))),
            global,
            gauge: Arc::new(InFlightGauge::new()),
        }
    }

    /// Waits for the per-job slot first, then the global one
    pub async fn acquire(&self) -> Result<StageSlot, AcquireError> {
        let local = Arc::clone(&self.local).acquire_owned().await?;
        let global = match &self.global {
            Some(global) => Some(Arc::clone(global).acquire_owned().await?),
            None => None,
        };
        Ok(StageSlot {
            _gauge: self.gauge.enter(),
            _global: global,
            _local: local,
        })
    }

    #[must_use]
    pub fn gauge(&self) -> &Arc<InFlightGauge> {
        &self.gauge
    }
}

/// Limiters for both network-bound stages of one job
#[derive(Debug, Clone)]
pub struct ConcurrencyLimits {
    pub fetch: StageLimiter,
    pub enrich: StageLimiter,
}

impl ConcurrencyLimits {
    #[must_use]
    pub fn new(fetch: usize, enrich: usize, global: Option<Arc<Semaphore>>) -> Self {
        Self {
            fetch: StageLimiter::new(fetch, global.clone()),
            enrich: StageLimiter::new(enrich, global),
        }
    }
}

/// Live counters for one job, shared by its tasks
#[derive(Debug, Default)]
pub struct JobCounters {
    pub windows_fetched: AtomicU64,
    pub windows_failed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub records_received: AtomicU64,
    pub records_truncated: AtomicU64,
    pub drafts_decoded: AtomicU64,
    pub decode_failures: AtomicU64,
    pub sold_confirmed: AtomicU64,
    pub sold_unknown: AtomicU64,
    pub probe_panics: AtomicU64,
}

impl JobCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    #[must_use]
    pub fn snapshot(&self, limits: &ConcurrencyLimits, elapsed_ms: u64) -> JobStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        JobStats {
            windows_fetched: get(&self.windows_fetched),
            windows_failed: get(&self.windows_failed),
            cache_hits: get(&self.cache_hits),
            records_received: get(&self.records_received),
            records_truncated: get(&self.records_truncated),
            drafts_decoded: get(&self.drafts_decoded),
            decode_failures: get(&self.decode_failures),
            sold_confirmed: get(&self.sold_confirmed),
            sold_unknown: get(&self.sold_unknown),
            probe_panics: get(&self.probe_panics),
            peak_fetch_in_flight: limits.fetch.gauge().peak(),
            peak_enrich_in_flight: limits.enrich.gauge().peak(),
            elapsed_ms,
        }
    }
}

/// Final statistics of a search job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub windows_fetched: u64,
    pub windows_failed: u64,
    pub cache_hits: u64,
    pub records_received: u64,
    pub records_truncated: u64,
    pub drafts_decoded: u64,
    pub decode_failures: u64,
    pub sold_confirmed: u64,
    pub sold_unknown: u64,
    pub probe_panics: u64,
    pub peak_fetch_in_flight: usize,
    pub peak_enrich_in_flight: usize,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn gauge_tracks_peak_after_release() {
        let gauge = Arc::new(InFlightGauge::new());
        let a = gauge.enter();
        let b = gauge.enter();
        assert_eq!(gauge.current(), 2);
        drop(a);
        drop(b);
        let _c = gauge.enter();

        assert_eq!(gauge.current(), 1);
        assert_eq!(gauge.peak(), 2);
    }

    #[tokio::test]
    async fn limiter_never_exceeds_its_bound() {
        let limiter = StageLimiter::new(3, None);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let _slot = limiter.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(limiter.gauge().peak(), 3);
        assert_eq!(limiter.gauge().current(), 0);
    }

    #[tokio::test]
    async fn global_ceiling_caps_both_stages_together() {
        let global = Arc::new(Semaphore::new(2));
        let limits = ConcurrencyLimits::new(5, 5, Some(Arc::clone(&global)));

        let _a = limits.fetch.acquire().await.unwrap();
        let _b = limits.enrich.acquire().await.unwrap();

        assert_eq!(global.available_permits(), 0);
        let blocked = tokio::time::timeout(Duration::from_millis(20), limits.fetch.acquire()).await;
        assert!(blocked.is_err());
    }
}
