//! Short-lived memoization of scripthash query results.
//!
//! Entries are keyed by `(operation, key)` so different queries on the same
//! scripthash never collide. Expired entries are treated as absent on read
//! and dropped lazily; there is no size bound.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Process-wide result cache, shared as `Arc<MemoryCache>`.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, String), Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the cached value, if present, unexpired and of type `T`.
    pub fn get<T>(&self, op: &str, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let k = (op.to_string(), key.to_string());

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&k) {
                Some(entry) if entry.expires_at > now => {
                    log::trace!("[CACHE] hit {} {}", op, key);
                    return entry.value.downcast_ref::<T>().cloned();
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict unless a concurrent writer refreshed it meanwhile.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(&k).is_some_and(|e| e.expires_at <= now) {
            entries.remove(&k);
            log::trace!("[CACHE] expired {} {}", op, key);
        }
        None
    }

    /// Stores `value` for `ttl`, replacing any previous entry for the key.
    pub fn set<T>(&self, op: &str, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = Entry {
            value: Arc::new(value),
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((op.to_string(), key.to_string()), entry);
    }

    /// Drops every expired entry. Reads never need this.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
