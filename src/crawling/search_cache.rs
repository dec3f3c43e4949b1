//! Bounded TTL cache for search-window responses
//!
//! Keyed by `(term, offset, limit)`. Capacity is fixed: inserting into a full
//! cache evicts the oldest entry. Entries older than the TTL are treated as
//! absent and dropped on lookup.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::infrastructure::SearchPage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub term: String,
    pub offset: u64,
    pub limit: u64,
}

impl CacheKey {
    #[must_use]
    pub fn new(term: &str, offset: u64, limit: u64) -> Self {
        Self {
            term: term.to_string(),
            offset,
            limit,
        }
    }
}

#[derive(Debug)]
pub struct SearchCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<CacheKey, (Instant, SearchPage)>,
    order: VecDeque<CacheKey>,
}

impl SearchCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// A zero capacity or TTL turns the cache off
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0 && !self.ttl.is_zero()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<SearchPage> {
        let (stored_at, page) = self.entries.get(key)?;
        if stored_at.elapsed() < self.ttl {
            return Some(page.clone());
        }
        self.remove(key);
        None
    }

    pub fn insert(&mut self, key: CacheKey, page: SearchPage) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.contains_key(&key) {
            self.remove(&key);
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, (Instant::now(), page));
    }

    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total: u64) -> SearchPage {
        SearchPage {
            results: Vec::new(),
            total,
        }
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let mut cache = SearchCache::new(2, Duration::from_secs(60));
        cache.insert(CacheKey::new("a", 0, 50), page(1));
        cache.insert(CacheKey::new("a", 50, 50), page(2));
        cache.insert(CacheKey::new("a", 100, 50), page(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("a", 0, 50)).is_none());
        assert_eq!(cache.get(&CacheKey::new("a", 100, 50)).unwrap().total, 3);
    }

    #[test]
    fn reinserting_a_key_refreshes_its_position() {
        let mut cache = SearchCache::new(2, Duration::from_secs(60));
        cache.insert(CacheKey::new("a", 0, 50), page(1));
        cache.insert(CacheKey::new("b", 0, 50), page(2));
        cache.insert(CacheKey::new("a", 0, 50), page(10));
        cache.insert(CacheKey::new("c", 0, 50), page(3));

        assert!(cache.get(&CacheKey::new("b", 0, 50)).is_none());
        assert_eq!(cache.get(&CacheKey::new("a", 0, 50)).unwrap().total, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_dropped() {
        let mut cache = SearchCache::new(4, Duration::from_secs(300));
        let key = CacheKey::new("laptop", 0, 50);
        cache.insert(key.clone(), page(120));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = SearchCache::new(0, Duration::from_secs(60));
        cache.insert(CacheKey::new("a", 0, 50), page(1));
        assert!(cache.is_empty());
    }
}
