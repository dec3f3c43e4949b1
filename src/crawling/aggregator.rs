//! Aggregator
//!
//! Single mutual-exclusion point that every enrichment task feeds into.
//! Order-insensitive; drained only after all tasks are joined.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::EnrichedProduct;

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    products: Arc<Mutex<Vec<EnrichedProduct>>>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, product: EnrichedProduct) {
        self.products.lock().await.push(product);
    }

    pub async fn len(&self) -> usize {
        self.products.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.lock().await.is_empty()
    }

    /// Takes the accumulated set, leaving the aggregator empty
    pub async fn drain(&self) -> Vec<EnrichedProduct> {
        std::mem::take(&mut *self.products.lock().await)
    }
}
