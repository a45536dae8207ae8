use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::electrum::{Balance, ElectrumApi, HistoryEntry, UtxoEntry};
use crate::error::{Error, Result};

pub const BALANCE_OP: &str = "scripthash_get_balance";
pub const HISTORY_OP: &str = "scripthash_get_history";
pub const LISTUNSPENT_OP: &str = "scripthash_listunspent";

/// Read-through scripthash queries: cache first, then the Electrum channel.
///
/// Channel failures are wrapped once and never retried here.
#[derive(Clone)]
pub struct ScripthashQuery {
    electrum: Arc<dyn ElectrumApi>,
    cache: Arc<MemoryCache>,
    ttl: Duration,
}

impl ScripthashQuery {
    pub fn new(electrum: Arc<dyn ElectrumApi>, cache: Arc<MemoryCache>, ttl: Duration) -> Self {
        Self { electrum, cache, ttl }
    }

    pub async fn balance(&self, scripthash: &str) -> Result<Balance> {
        self.read_through(BALANCE_OP, scripthash, || {
            self.electrum.scripthash_get_balance(scripthash)
        })
        .await
    }

    pub async fn history(&self, scripthash: &str) -> Result<Vec<HistoryEntry>> {
        self.read_through(HISTORY_OP, scripthash, || {
            self.electrum.scripthash_get_history(scripthash)
        })
        .await
    }

    pub async fn utxos(&self, scripthash: &str) -> Result<Vec<UtxoEntry>> {
        self.read_through(LISTUNSPENT_OP, scripthash, || {
            self.electrum.scripthash_listunspent(scripthash)
        })
        .await
    }

    async fn read_through<T, F, Fut>(&self, op: &'static str, scripthash: &str, fetch: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(op, scripthash) {
            return Ok(hit);
        }

        log::debug!("[QUERY] {} {} (cache miss)", op, scripthash);
        let value = fetch().await.map_err(|e| {
            log::warn!("[QUERY] {} {} failed: {:#}", op, scripthash, e);
            Error::upstream(op, e)
        })?;

        self.cache.set(op, scripthash, value.clone(), self.ttl);
        Ok(value)
    }
}
