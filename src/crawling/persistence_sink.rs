//! Persistence sink
//!
//! Deduplicates by canonical URL (last record wins, first-occurrence order
//! kept), then upserts in chunks with one transaction per chunk.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::EnrichedProduct;
use crate::infrastructure::ProductStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Keys that did not exist before
    pub upserted: usize,
    /// Keys that already existed and were overwritten
    pub modified: usize,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chunk {chunk} failed after {committed:?} were committed: {source}")]
    ChunkFailed {
        chunk: usize,
        committed: PersistReport,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn ProductStore>,
    chunk_size: usize,
}

impl std::fmt::Debug for PersistenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSink")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl PersistenceSink {
    #[must_use]
    pub fn new(store: Arc<dyn ProductStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    pub async fn persist(&self, records: &[EnrichedProduct]) -> Result<PersistReport, PersistenceError> {
        let unique = dedup_by_url(records);
        let mut report = PersistReport::default();

        for (chunk, batch) in unique.chunks(self.chunk_size).enumerate() {
            match self.store.upsert_batch(batch).await {
                Ok(outcome) => {
                    report.upserted += outcome.inserted;
                    report.modified += outcome.updated;
                }
                Err(e) if chunk == 0 => {
                    error!(records = batch.len(), error = %e, "Persisting products failed");
                    return Err(PersistenceError::Database(e));
                }
                Err(e) => {
                    error!(chunk, records = batch.len(), error = %e, "Persisting product chunk failed");
                    return Err(PersistenceError::ChunkFailed {
                        chunk,
                        committed: report,
                        source: e,
                    });
                }
            }
        }

        info!(
            received = records.len(),
            unique = unique.len(),
            upserted = report.upserted,
            modified = report.modified,
            "Products persisted"
        );
        Ok(report)
    }
}

/// One record per URL: the last one wins, placed where the URL first appeared
#[must_use]
pub fn dedup_by_url(records: &[EnrichedProduct]) -> Vec<EnrichedProduct> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<EnrichedProduct> = Vec::with_capacity(records.len());

    for record in records {
        match position.get(record.url()) {
            Some(&index) => unique[index] = record.clone(),
            None => {
                position.insert(record.url(), unique.len());
                unique.push(record.clone());
            }
        }
    }
    unique
}
