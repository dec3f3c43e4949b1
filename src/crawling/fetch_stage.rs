//! Fetch stage
//!
//! Fetches one search window and decodes its records. A window never fails
//! the job: timeouts, bad statuses and malformed bodies all yield zero drafts.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::crawling::item_decoder::decode_item;
use crate::crawling::search_cache::{CacheKey, SearchCache};
use crate::crawling::state::{JobCounters, StageLimiter};
use crate::domain::{ProductDraft, Window};
use crate::infrastructure::{MarketplaceClient, SearchPage};

/// Drafts decoded from one window
#[derive(Debug, Clone, Default)]
pub struct WindowOutcome {
    pub drafts: Vec<ProductDraft>,
    pub from_cache: bool,
    pub failed: bool,
}

/// Shared across jobs; owns the response cache
#[derive(Debug)]
pub struct FetchStage {
    client: MarketplaceClient,
    cache: Mutex<SearchCache>,
}

impl FetchStage {
    #[must_use]
    pub fn new(client: MarketplaceClient, cache: SearchCache) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
        }
    }

    pub async fn fetch_window(
        &self,
        term: &str,
        window: Window,
        limiter: &StageLimiter,
        counters: &JobCounters,
    ) -> WindowOutcome {
        let key = CacheKey::new(term, window.offset, window.size);

        let cached = self.cache_lookup(&key);
        let from_cache = cached.is_some();
        let page = match cached {
            Some(page) => {
                debug!(term, offset = window.offset, "Search window served from cache");
                JobCounters::incr(&counters.cache_hits);
                page
            }
            None => match self.fetch_remote(term, window, limiter).await {
                Some(page) => {
                    self.cache_store(key, page.clone());
                    page
                }
                None => {
                    JobCounters::incr(&counters.windows_failed);
                    return WindowOutcome {
                        failed: true,
                        ..WindowOutcome::default()
                    };
                }
            },
        };
        JobCounters::incr(&counters.windows_fetched);

        let drafts = decode_page(term, window, page, counters);
        WindowOutcome {
            drafts,
            from_cache,
            failed: false,
        }
    }

    async fn fetch_remote(&self, term: &str, window: Window, limiter: &StageLimiter) -> Option<SearchPage> {
        let url = self.client.search_url(term, window.offset, window.size);

        let _slot = match limiter.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(term, offset = window.offset, %url, error = %e, "Fetch slot unavailable");
                return None;
            }
        };

        match self.client.search(term, window.offset, window.size).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!(term, offset = window.offset, %url, error = %e, "Search window failed");
                None
            }
        }
    }

    fn cache_lookup(&self, key: &CacheKey) -> Option<SearchPage> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn cache_store(&self, key: CacheKey, page: SearchPage) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, page);
    }
}

fn decode_page(term: &str, window: Window, page: SearchPage, counters: &JobCounters) -> Vec<ProductDraft> {
    let mut records = page.results;
    JobCounters::add(&counters.records_received, records.len() as u64);

    let keep = usize::try_from(window.size).unwrap_or(usize::MAX);
    if records.len() > keep {
        JobCounters::add(&counters.records_truncated, (records.len() - keep) as u64);
        records.truncate(keep);
    }

    let extracted_at = Utc::now();
    let mut drafts = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match decode_item(raw, extracted_at) {
            Ok(decoded) => {
                if !decoded.defaulted.is_empty() {
                    debug!(
                        term,
                        offset = window.offset,
                        url = %decoded.draft.url,
                        defaulted = ?decoded.defaulted,
                        "Record decoded with defaults"
                    );
                }
                drafts.push(decoded.draft);
            }
            Err(e) => {
                JobCounters::incr(&counters.decode_failures);
                warn!(
                    term,
                    offset = window.offset,
                    position = index,
                    error = %e,
                    "Skipping undecodable search record"
                );
            }
        }
    }

    JobCounters::add(&counters.drafts_decoded, drafts.len() as u64);
    drafts
}
