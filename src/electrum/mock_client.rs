use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::electrum::api::ElectrumApi;
use crate::electrum::types::{Balance, HeaderNotification, HistoryEntry, UtxoEntry};

/// Pure in-memory mock Electrum client for tests.
///
/// Unknown scripthashes answer with an empty history/UTXO set and a zero
/// balance, like a real server does.
#[derive(Default)]
pub struct MockElectrumClient {
    pub balances: HashMap<String, Balance>,
    pub histories: HashMap<String, Vec<HistoryEntry>>,
    pub unspent: HashMap<String, Vec<UtxoEntry>>,
    pub transactions: HashMap<String, Value>,
    pub tip: u32,
    /// When set, every call fails with this message.
    pub fail_with: Option<String>,
    calls: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockElectrumClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, scripthash: &str, balance: Balance) -> Self {
        self.balances.insert(scripthash.to_string(), balance);
        self
    }

    pub fn with_history(mut self, scripthash: &str, history: Vec<HistoryEntry>) -> Self {
        self.histories.insert(scripthash.to_string(), history);
        self
    }

    pub fn with_unspent(mut self, scripthash: &str, utxos: Vec<UtxoEntry>) -> Self {
        self.unspent.insert(scripthash.to_string(), utxos);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Method names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &str) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(method.to_string());
        match &self.fail_with {
            Some(msg) => Err(anyhow!("{}", msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ElectrumApi for MockElectrumClient {
    async fn scripthash_get_balance(&self, scripthash: &str) -> Result<Balance> {
        self.record("blockchain.scripthash.get_balance")?;
        Ok(self.balances.get(scripthash).copied().unwrap_or_default())
    }

    async fn scripthash_get_history(&self, scripthash: &str) -> Result<Vec<HistoryEntry>> {
        self.record("blockchain.scripthash.get_history")?;
        Ok(self.histories.get(scripthash).cloned().unwrap_or_default())
    }

    async fn scripthash_listunspent(&self, scripthash: &str) -> Result<Vec<UtxoEntry>> {
        self.record("blockchain.scripthash.listunspent")?;
        Ok(self.unspent.get(scripthash).cloned().unwrap_or_default())
    }

    async fn transaction_get(&self, txid: &str, _verbose: bool) -> Result<Value> {
        self.record("blockchain.transaction.get")?;
        self.transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| anyhow!("No such mempool or blockchain transaction"))
    }

    async fn headers_subscribe(&self) -> Result<HeaderNotification> {
        self.record("blockchain.headers.subscribe")?;
        Ok(HeaderNotification {
            height: self.tip,
            hex: String::new(),
        })
    }
}
