use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::address::history::{page_start, progress_key, sort_recent_first};
use crate::address::{AddressService, ScripthashQuery};
use crate::cache::MemoryCache;
use crate::electrum::mock_client::MockElectrumClient;
use crate::electrum::{scripthash, Balance, HistoryEntry, UtxoEntry};
use crate::error::Error;
use crate::esplora::{Stats, Transaction, TxStatus};
use crate::node::{AddressInfo, AddressValidator, TransactionSource};
use crate::progress::ProgressReporter;

// =========================================================================
// Helpers
// =========================================================================

const ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
const SCRIPT: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";

fn scripthash() -> String {
    scripthash::encode(SCRIPT).unwrap()
}

fn txid(i: usize) -> String {
    format!("{:064x}", i)
}

fn confirmed(i: usize, height: i64) -> HistoryEntry {
    HistoryEntry {
        tx_hash: txid(i),
        height,
        fee: None,
    }
}

fn pending(i: usize, height: i64) -> HistoryEntry {
    HistoryEntry {
        tx_hash: txid(i),
        height,
        fee: Some(200),
    }
}

fn status_at(height: Option<u32>) -> TxStatus {
    match height {
        Some(h) => TxStatus {
            confirmed: true,
            block_height: Some(h),
            block_hash: Some(format!("{:064x}", h)),
            block_time: Some(1_600_000_000 + h as u64),
        },
        None => TxStatus::default(),
    }
}

struct FakeValidator {
    calls: Mutex<usize>,
    unavailable: bool,
}

#[async_trait]
impl AddressValidator for FakeValidator {
    async fn validate(&self, address: &str) -> Result<AddressInfo> {
        *self.calls.lock().unwrap() += 1;
        if self.unavailable {
            return Err(anyhow!("connection refused"));
        }
        if address.eq_ignore_ascii_case(ADDRESS) {
            Ok(AddressInfo {
                is_valid: true,
                address: ADDRESS.to_string(),
                script_pub_key: SCRIPT.to_string(),
            })
        } else {
            Ok(AddressInfo::invalid(address))
        }
    }
}

#[derive(Default)]
struct FakeTransactions {
    statuses: HashMap<String, TxStatus>,
    failing: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl FakeTransactions {
    fn with(mut self, txid: String, status: TxStatus) -> Self {
        self.statuses.insert(txid, status);
        self
    }

    fn failing_on(mut self, txid: String) -> Self {
        self.failing.insert(txid);
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSource for FakeTransactions {
    async fn transaction(&self, txid: &str, _verbose: bool, _include_status: bool) -> Result<Transaction> {
        self.fetched.lock().unwrap().push(txid.to_string());
        if self.failing.contains(txid) {
            return Err(anyhow!("No such mempool or blockchain transaction"));
        }
        Ok(Transaction {
            txid: txid.to_string(),
            version: 2,
            locktime: 0,
            size: 100,
            weight: 400,
            vin: vec![],
            vout: vec![],
            status: self.statuses.get(txid).cloned().unwrap_or_default(),
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    updates: Mutex<Vec<(String, f64)>>,
}

impl RecordingProgress {
    fn values(&self) -> Vec<f64> {
        self.updates.lock().unwrap().iter().map(|(_, v)| *v).collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn set_progress(&self, key: &str, percent: f64) {
        self.updates.lock().unwrap().push((key.to_string(), percent));
    }
}

struct Harness {
    electrum: Arc<MockElectrumClient>,
    validator: Arc<FakeValidator>,
    transactions: Arc<FakeTransactions>,
    progress: Arc<RecordingProgress>,
    service: AddressService,
}

fn harness(electrum: MockElectrumClient, transactions: FakeTransactions) -> Harness {
    let electrum = Arc::new(electrum);
    let validator = Arc::new(FakeValidator {
        calls: Mutex::new(0),
        unavailable: false,
    });
    let transactions = Arc::new(transactions);
    let progress = Arc::new(RecordingProgress::default());

    let query = ScripthashQuery::new(electrum.clone(), Arc::new(MemoryCache::new()), Duration::from_secs(2));
    let service = AddressService::new(query, validator.clone(), transactions.clone(), progress.clone());

    Harness {
        electrum,
        validator,
        transactions,
        progress,
        service,
    }
}

/// 25 confirmed entries at heights 1..=25, shuffled.
fn long_history() -> Vec<HistoryEntry> {
    let mut history: Vec<_> = (1..=25).map(|i| confirmed(i, i as i64)).collect();
    history.reverse();
    history.swap(0, 13);
    history.swap(3, 20);
    history
}

// =========================================================================
// Address stats
// =========================================================================

#[tokio::test]
async fn invalid_address_yields_zero_stats_without_upstream_calls() {
    let h = harness(MockElectrumClient::new(), FakeTransactions::default());

    let stats = h.service.address_stats("definitely-not-an-address").await.unwrap();

    assert_eq!(stats.address, "definitely-not-an-address");
    assert_eq!(stats.chain_stats, Stats::default());
    assert_eq!(stats.mempool_stats, Stats::default());
    assert!(!stats.electrum);
    assert_eq!(h.electrum.call_count(), 0);
}

#[tokio::test]
async fn reconciles_balance_and_history() {
    let sh = scripthash();
    let mock = MockElectrumClient::new()
        .with_balance(&sh, Balance { confirmed: 500, unconfirmed: -200 })
        .with_history(&sh, vec![confirmed(1, 100), pending(2, 0), confirmed(3, 120)]);
    let h = harness(mock, FakeTransactions::default());

    let stats = h.service.address_stats(ADDRESS).await.unwrap();

    assert_eq!(stats.address, ADDRESS);
    assert!(stats.electrum);
    assert_eq!(
        stats.chain_stats,
        Stats {
            funded_txo_count: 0,
            funded_txo_sum: 500,
            spent_txo_count: 0,
            spent_txo_sum: 0,
            tx_count: 2,
        }
    );
    assert_eq!(
        stats.mempool_stats,
        Stats {
            funded_txo_count: 0,
            funded_txo_sum: 0,
            spent_txo_count: 0,
            spent_txo_sum: 200,
            tx_count: 1,
        }
    );
}

#[tokio::test]
async fn negative_confirmed_balance_passes_through_as_spent() {
    let sh = scripthash();
    let mock = MockElectrumClient::new()
        .with_balance(&sh, Balance { confirmed: -300, unconfirmed: 700 });
    let h = harness(mock, FakeTransactions::default());

    let stats = h.service.address_stats(ADDRESS).await.unwrap();

    assert_eq!(stats.chain_stats.funded_txo_sum, 0);
    assert_eq!(stats.chain_stats.spent_txo_sum, -300);
    assert_eq!(stats.mempool_stats.funded_txo_sum, 700);
    assert_eq!(stats.mempool_stats.spent_txo_sum, 0);
    assert_eq!(stats.chain_stats.tx_count, 0);
}

#[tokio::test]
async fn stats_surface_a_single_upstream_error() {
    let h = harness(MockElectrumClient::new().failing("socket hang up"), FakeTransactions::default());

    let err = h.service.address_stats(ADDRESS).await.unwrap_err();

    match err {
        Error::Upstream { message, .. } => assert!(message.contains("socket hang up")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn repeated_lookups_are_served_from_cache() {
    let sh = scripthash();
    let mock = MockElectrumClient::new()
        .with_balance(&sh, Balance { confirmed: 1, unconfirmed: 0 })
        .with_history(&sh, vec![confirmed(1, 10)]);
    let h = harness(mock, FakeTransactions::default());

    let first = h.service.address_stats(ADDRESS).await.unwrap();
    let second = h.service.address_stats(ADDRESS).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.electrum.call_count(), 2);

    // History is shared with the paginator's cache namespace.
    h.service.address_transactions(ADDRESS, None).await.unwrap();
    assert_eq!(h.electrum.call_count(), 2);
}

#[tokio::test]
async fn validator_outage_is_an_error() {
    let electrum = Arc::new(MockElectrumClient::new());
    let query = ScripthashQuery::new(electrum.clone(), Arc::new(MemoryCache::new()), Duration::from_secs(2));
    let service = AddressService::new(
        query,
        Arc::new(FakeValidator {
            calls: Mutex::new(0),
            unavailable: true,
        }),
        Arc::new(FakeTransactions::default()),
        Arc::new(RecordingProgress::default()),
    );

    let err = service.address_stats(ADDRESS).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(electrum.call_count(), 0);
}

// =========================================================================
// History pagination
// =========================================================================

#[test]
fn sorts_mempool_first_then_descending_height() {
    let mut history = vec![
        confirmed(1, 100),
        pending(2, 0),
        confirmed(3, 300),
        confirmed(4, 200),
        pending(5, -1),
    ];
    sort_recent_first(&mut history);

    let order: Vec<_> = history.iter().map(|h| h.tx_hash.clone()).collect();
    assert_eq!(order, vec![txid(2), txid(5), txid(3), txid(4), txid(1)]);
}

#[test]
fn cursor_positions() {
    let history: Vec<_> = (0..6).map(|i| confirmed(i, 10)).collect();

    assert_eq!(page_start(&history, None), 0);
    assert_eq!(page_start(&history, Some(&txid(0))), 1);
    assert_eq!(page_start(&history, Some(&txid(4))), 5);
    assert_eq!(page_start(&history, Some(&txid(99))), 0);
}

#[tokio::test]
async fn first_page_is_capped_and_ordered() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    let page = h.service.address_transactions(ADDRESS, None).await.unwrap();

    let ids: Vec<_> = page.iter().map(|t| t.txid.clone()).collect();
    let expected: Vec<_> = (16..=25).rev().map(txid).collect();
    assert_eq!(ids, expected);
    assert_eq!(h.transactions.fetched(), expected);
}

#[tokio::test]
async fn cursor_resumes_after_fifth_element() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    // Sorted order is heights 25, 24, ...; the fifth element is height 21.
    let page = h
        .service
        .address_transactions(ADDRESS, Some(&txid(21)))
        .await
        .unwrap();

    let ids: Vec<_> = page.iter().map(|t| t.txid.clone()).collect();
    let expected: Vec<_> = (11..=20).rev().map(txid).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn cursor_on_first_element_is_not_treated_as_missing() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    let page = h
        .service
        .address_transactions(ADDRESS, Some(&txid(25)))
        .await
        .unwrap();

    assert_eq!(page.first().map(|t| t.txid.clone()), Some(txid(24)));
    assert_eq!(page.len(), 10);
}

#[tokio::test]
async fn unknown_cursor_restarts_from_the_top() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    let page = h
        .service
        .address_transactions(ADDRESS, Some(&txid(999)))
        .await
        .unwrap();

    assert_eq!(page.first().map(|t| t.txid.clone()), Some(txid(25)));
}

#[tokio::test]
async fn last_page_is_short_and_progress_reaches_100() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    let page = h
        .service
        .address_transactions(ADDRESS, Some(&txid(6)))
        .await
        .unwrap();

    let ids: Vec<_> = page.iter().map(|t| t.txid.clone()).collect();
    assert_eq!(ids, (1..=5).rev().map(txid).collect::<Vec<_>>());
    assert_eq!(h.progress.values(), vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);

    let keys: HashSet<_> = h
        .progress
        .updates
        .lock()
        .unwrap()
        .iter()
        .map(|(k, _)| k.clone())
        .collect();
    assert_eq!(keys, HashSet::from([progress_key(ADDRESS)]));
}

#[tokio::test]
async fn page_past_the_end_is_empty_and_complete() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default(),
    );

    let page = h
        .service
        .address_transactions(ADDRESS, Some(&txid(1)))
        .await
        .unwrap();

    assert!(page.is_empty());
    assert_eq!(h.progress.values(), vec![0.0, 100.0]);
}

#[tokio::test]
async fn failure_mid_page_returns_nothing_and_completes_progress() {
    let sh = scripthash();
    let h = harness(
        MockElectrumClient::new().with_history(&sh, long_history()),
        FakeTransactions::default().failing_on(txid(23)),
    );

    let err = h.service.address_transactions(ADDRESS, None).await.unwrap_err();

    assert!(matches!(err, Error::Upstream { operation: "transaction_get", .. }));
    assert_eq!(h.transactions.fetched(), vec![txid(25), txid(24), txid(23)]);
    assert_eq!(h.progress.values(), vec![0.0, 10.0, 20.0, 100.0]);
}

#[tokio::test]
async fn history_failure_completes_progress() {
    let h = harness(MockElectrumClient::new().failing("timeout"), FakeTransactions::default());

    assert!(h.service.address_transactions(ADDRESS, None).await.is_err());
    assert_eq!(h.progress.values(), vec![0.0, 100.0]);
}

#[tokio::test]
async fn invalid_address_has_no_transactions() {
    let h = harness(MockElectrumClient::new(), FakeTransactions::default());

    let page = h.service.address_transactions("nope", None).await.unwrap();

    assert!(page.is_empty());
    assert_eq!(h.electrum.call_count(), 0);
    assert!(h.progress.values().is_empty());
    assert_eq!(*h.validator.calls.lock().unwrap(), 1);
}

// =========================================================================
// UTXOs
// =========================================================================

fn utxo(i: usize, pos: u32, value: u64) -> UtxoEntry {
    UtxoEntry {
        tx_hash: txid(i),
        tx_pos: pos,
        value,
        height: 0,
    }
}

#[tokio::test]
async fn utxos_carry_their_transaction_status() {
    let sh = scripthash();
    let mock = MockElectrumClient::new()
        .with_unspent(&sh, vec![utxo(3, 1, 5_000), utxo(1, 0, 10_000), utxo(2, 4, 1)]);
    let txs = FakeTransactions::default()
        .with(txid(1), status_at(Some(700_000)))
        .with(txid(3), status_at(Some(700_100)));
    let h = harness(mock, txs);

    let utxos = h.service.address_utxos(ADDRESS).await.unwrap();

    assert_eq!(utxos.len(), 3);
    assert_eq!(
        utxos.iter().map(|u| (u.txid.clone(), u.vout, u.value)).collect::<Vec<_>>(),
        vec![(txid(3), 1, 5_000), (txid(1), 0, 10_000), (txid(2), 4, 1)]
    );
    assert_eq!(utxos[0].status, status_at(Some(700_100)));
    assert_eq!(utxos[1].status, status_at(Some(700_000)));
    assert_eq!(utxos[2].status, TxStatus::default());
}

#[tokio::test]
async fn utxo_fetch_failure_aborts() {
    let sh = scripthash();
    let mock = MockElectrumClient::new().with_unspent(&sh, vec![utxo(1, 0, 1), utxo(2, 0, 2), utxo(3, 0, 3)]);
    let h = harness(mock, FakeTransactions::default().failing_on(txid(2)));

    let err = h.service.address_utxos(ADDRESS).await.unwrap_err();

    assert!(matches!(err, Error::Upstream { .. }));
    assert_eq!(h.transactions.fetched(), vec![txid(1), txid(2)]);
}

#[tokio::test]
async fn invalid_address_has_no_utxos() {
    let h = harness(MockElectrumClient::new(), FakeTransactions::default());
    assert!(h.service.address_utxos("nope").await.unwrap().is_empty());
    assert_eq!(h.electrum.call_count(), 0);
}
