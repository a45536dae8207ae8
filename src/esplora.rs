//! Caller-facing shapes, matching the Esplora REST API JSON.

use serde::{Deserialize, Serialize};

/// Per-bucket aggregate of an address' activity.
///
/// Sums are signed: they pass through the node's net balance (see
/// [`crate::address::stats`]). The txo counts are never populated because
/// Electrum only reports net sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub funded_txo_count: u64,
    pub funded_txo_sum: i64,
    pub spent_txo_count: u64,
    pub spent_txo_sum: i64,
    pub tx_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    pub address: String,
    pub chain_stats: Stats,
    pub mempool_stats: Stats,
    /// Marks stats reconciled from an Electrum backend.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub electrum: bool,
}

impl AddressStats {
    /// The result for an address the validator rejected.
    pub fn empty(address: &str) -> Self {
        Self {
            address: address.to_string(),
            chain_stats: Stats::default(),
            mempool_stats: Stats::default(),
            electrum: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vout {
    pub scriptpubkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scriptpubkey_address: Option<String>,
    pub scriptpubkey_type: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vin {
    pub txid: String,
    pub vout: u32,
    pub is_coinbase: bool,
    pub scriptsig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Vec<String>>,
    pub sequence: u32,
    /// Only resolved for verbose fetches.
    pub prevout: Option<Vout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub version: i32,
    pub locktime: u32,
    pub size: u32,
    pub weight: u32,
    pub vin: Vec<Vin>,
    pub vout: Vec<Vout>,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub status: TxStatus,
    pub value: u64,
}
