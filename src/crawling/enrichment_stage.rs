//! Enrichment stage
//!
//! One task per draft. The worker holds its slot for the probe and for the
//! politeness delay after it, so per-job throughput stays bounded by
//! `concurrency / delay`. Enrichment never fails: errors and panics in the
//! probe leave the product with an unknown units-sold count.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, warn};

use crate::crawling::sold_probe::SoldProbe;
use crate::crawling::state::{JobCounters, StageLimiter};
use crate::domain::{EnrichedProduct, ProductDraft, SoldCount};

#[derive(Debug, Clone)]
pub struct EnrichmentStage {
    probe: Arc<SoldProbe>,
    delay: Duration,
}

impl EnrichmentStage {
    #[must_use]
    pub fn new(probe: Arc<SoldProbe>, delay: Duration) -> Self {
        Self { probe, delay }
    }

    pub async fn enrich(
        &self,
        draft: ProductDraft,
        limiter: &StageLimiter,
        counters: &JobCounters,
    ) -> EnrichedProduct {
        let _slot = match limiter.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(url = %draft.url, error = %e, "Enrichment slot unavailable");
                JobCounters::incr(&counters.sold_unknown);
                return EnrichedProduct::unenriched(draft);
            }
        };

        let sold = match AssertUnwindSafe(self.probe.probe(&draft)).catch_unwind().await {
            Ok(sold) => sold,
            Err(panic) => {
                error!(url = %draft.url, panic = panic_message(panic.as_ref()), "Units-sold probe panicked");
                JobCounters::incr(&counters.probe_panics);
                SoldCount::Unknown
            }
        };

        if sold.is_known() {
            JobCounters::incr(&counters.sold_confirmed);
        } else {
            JobCounters::incr(&counters.sold_unknown);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        EnrichedProduct::new(draft, sold)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
