//! Balance + history -> Esplora address stats.
//!
//! Electrum only reports a net balance per scripthash, so funded and spent
//! sums are read off the sign of that balance and the txo counts stay 0.
//! Callers must not treat these as a per-output ledger.

use crate::address::AddressService;
use crate::electrum::{Balance, HistoryEntry};
use crate::error::Result;
use crate::esplora::{AddressStats, Stats};

impl AddressService {
    /// Reconciled chain and mempool stats for `address`.
    ///
    /// Balance and history are fetched concurrently; either failing fails the
    /// whole call.
    pub async fn address_stats(&self, address: &str) -> Result<AddressStats> {
        let Some(resolved) = self.resolve(address).await? else {
            return Ok(AddressStats::empty(address));
        };

        let (balance, history) = tokio::try_join!(
            self.query.balance(&resolved.scripthash),
            self.query.history(&resolved.scripthash),
        )?;

        Ok(reconcile(&resolved.address, balance, &history))
    }
}

/// Pending entries are the ones carrying a fee.
pub fn reconcile(address: &str, balance: Balance, history: &[HistoryEntry]) -> AddressStats {
    let unconfirmed = history.iter().filter(|h| h.fee.is_some()).count() as u64;
    let total = history.len() as u64;

    AddressStats {
        address: address.to_string(),
        chain_stats: Stats {
            funded_txo_count: 0,
            funded_txo_sum: balance.confirmed.max(0),
            spent_txo_count: 0,
            // A negative confirmed balance is passed through as-is.
            spent_txo_sum: balance.confirmed.min(0),
            tx_count: total - unconfirmed,
        },
        mempool_stats: Stats {
            funded_txo_count: 0,
            funded_txo_sum: balance.unconfirmed.max(0),
            spent_txo_count: 0,
            spent_txo_sum: -balance.unconfirmed.min(0),
            tx_count: unconfirmed,
        },
        electrum: true,
    }
}
