//! Test utilities for product-harvest
//!
//! Scripted transport, in-memory database and record builders shared by the
//! unit tests and the `tests/` integration suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use crate::domain::{Condition, EnrichedProduct, ProductDraft, SoldCount, SoldSource};
use crate::infrastructure::http_client::{FetchResponse, Transport, TransportError};
use crate::infrastructure::product_repository::{ProductStore, UpsertOutcome};
use crate::infrastructure::{DatabaseConnection, ProductRepository};

#[derive(Debug, Clone)]
enum Scripted {
    Respond {
        status: u16,
        body: String,
        delay: Option<Duration>,
    },
    Fail(TransportError),
    Panic,
}

#[derive(Default)]
struct MockState {
    scripts: Mutex<HashMap<String, Scripted>>,
    default_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Transport double with per-URL scripted outcomes.
///
/// Unscripted URLs answer `404`. Every call is recorded, and the number of
/// concurrently running calls is tracked so tests can assert on bounds.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.script(
            url,
            Scripted::Respond {
                status,
                body: body.into(),
                delay: None,
            },
        );
    }

    pub fn respond_json(&self, url: &str, body: &Value) {
        self.respond(url, 200, body.to_string());
    }

    pub fn respond_with_delay(&self, url: &str, status: u16, body: impl Into<String>, delay: Duration) {
        self.script(
            url,
            Scripted::Respond {
                status,
                body: body.into(),
                delay: Some(delay),
            },
        );
    }

    pub fn fail(&self, url: &str, error: TransportError) {
        self.script(url, Scripted::Fail(error));
    }

    /// The call panics inside the transport
    pub fn panic_on(&self, url: &str) {
        self.script(url, Scripted::Panic);
    }

    /// Latency applied to every call without its own delay
    pub fn set_default_delay(&self, delay: Duration) {
        *lock(&self.state.default_delay) = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state.calls).clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        lock(&self.state.calls).iter().filter(|u| *u == url).count()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|u| u.starts_with(prefix))
            .count()
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, url: &str, scripted: Scripted) {
        lock(&self.state.scripts).insert(url.to_string(), scripted);
    }
}

struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_url(
        &self,
        url: &str,
        _headers: &HeaderMap,
        _timeout: Duration,
    ) -> Result<FetchResponse, TransportError> {
        lock(&self.state.calls).push(url.to_string());
        let _in_flight = InFlight::enter(&self.state);

        let scripted = lock(&self.state.scripts).get(url).cloned();
        let default_delay = *lock(&self.state.default_delay);

        match scripted {
            Some(Scripted::Respond { status, body, delay }) => {
                let delay = delay.unwrap_or(default_delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(FetchResponse::new(status, body))
            }
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Panic) => panic!("scripted transport panic for {url}"),
            None => {
                if !default_delay.is_zero() {
                    tokio::time::sleep(default_delay).await;
                }
                Ok(FetchResponse::new(404, "not found"))
            }
        }
    }
}

/// In-memory SQLite database with the schema applied
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let connection = DatabaseConnection::new("sqlite::memory:", 1).await?;
        connection.migrate().await?;
        Ok(Self { connection })
    }

    pub fn pool(&self) -> sqlx::Pool<sqlx::Sqlite> {
        self.connection.pool().clone()
    }

    pub fn repository(&self) -> ProductRepository {
        ProductRepository::new(self.pool())
    }
}

/// Store whose every write fails, for degraded-persistence paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

#[async_trait]
impl ProductStore for FailingStore {
    async fn upsert_batch(&self, _records: &[EnrichedProduct]) -> Result<UpsertOutcome, sqlx::Error> {
        Err(sqlx::Error::PoolClosed)
    }

    async fn find_by_title(&self, _term: &str) -> Result<Vec<EnrichedProduct>, sqlx::Error> {
        Err(sqlx::Error::PoolClosed)
    }
}

/// Enriched product with plausible values; `units_sold == 0` means unknown
pub fn sample_product(url: &str, title: &str, units_sold: u64) -> EnrichedProduct {
    let draft = ProductDraft {
        title: title.to_string(),
        original_price: 1_000.0,
        discounted_price: 900.0,
        discount_percentage: 10.0,
        seller: "VENDEDOR_TEST".to_string(),
        seller_id: Some(1),
        installments: 12,
        interest_free_months: 12,
        free_shipping: Some(true),
        condition: Condition::New,
        available_quantity: 5,
        url: url.to_string(),
        thumbnail_url: "https://http2.mlstatic.com/thumb.jpg".to_string(),
        category_id: "MLM1648".to_string(),
        item_id: None,
        ..ProductDraft::default()
    };
    let sold = if units_sold == 0 {
        SoldCount::Unknown
    } else {
        SoldCount::confirmed(units_sold, SoldSource::PageText)
    };
    EnrichedProduct::new(draft, sold)
}

/// Raw upstream search record as the search endpoint returns it
pub fn search_record(id: &str, title: &str, permalink: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "price": 900.0,
        "original_price": 1000.0,
        "permalink": permalink,
        "thumbnail": "https://http2.mlstatic.com/thumb.jpg",
        "category_id": "MLM1648",
        "condition": "new",
        "available_quantity": 3,
        "seller": {"id": 42, "nickname": "TIENDA"},
        "installments": {"quantity": 12, "rate": 0},
        "shipping": {"free_shipping": true}
    })
}

/// Search page body with `total` reported and the given records
pub fn search_page(total: u64, results: Vec<Value>) -> Value {
    json!({
        "results": results,
        "paging": {"total": total}
    })
}
