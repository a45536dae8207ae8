use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::electrum::types::{Balance, HeaderNotification, HistoryEntry, UtxoEntry};

/// Minimal Electrum interface used by the address layer.
/// Everything is scripthash-based.
///
/// Connection bootstrap, retries and reconnects belong to the implementor.
#[async_trait]
pub trait ElectrumApi: Send + Sync {
    async fn scripthash_get_balance(&self, scripthash: &str) -> Result<Balance>;

    /// Unordered, as returned by the server.
    async fn scripthash_get_history(&self, scripthash: &str) -> Result<Vec<HistoryEntry>>;

    async fn scripthash_listunspent(&self, scripthash: &str) -> Result<Vec<UtxoEntry>>;

    /// `blockchain.transaction.get`. Verbose returns the node's JSON object,
    /// otherwise the raw hex string.
    async fn transaction_get(&self, txid: &str, verbose: bool) -> Result<Value>;

    /// Current chain tip.
    async fn headers_subscribe(&self) -> Result<HeaderNotification>;
}
