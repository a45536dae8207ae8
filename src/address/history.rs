use crate::address::{AddressService, ResolvedAddress};
use crate::electrum::HistoryEntry;
use crate::error::{Error, Result};
use crate::esplora::Transaction;

impl AddressService {
    /// One page of `address`' transactions, most recent first, starting
    /// right after `last_seen_txid`.
    ///
    /// Progress is published under `address-<address>`. It always ends at
    /// 100, including when a fetch fails; a failed page returns nothing.
    pub async fn address_transactions(
        &self,
        address: &str,
        last_seen_txid: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let Some(resolved) = self.resolve(address).await? else {
            return Ok(Vec::new());
        };

        let key = progress_key(address);
        self.progress.set_progress(&key, 0.0);

        match self.fetch_page(&resolved, last_seen_txid, &key).await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.progress.set_progress(&key, 100.0);
                Err(e)
            }
        }
    }

    async fn fetch_page(
        &self,
        resolved: &ResolvedAddress,
        last_seen_txid: Option<&str>,
        progress_key: &str,
    ) -> Result<Vec<Transaction>> {
        let mut history = self.query.history(&resolved.scripthash).await?;
        sort_recent_first(&mut history);

        let start = page_start(&history, last_seen_txid);
        let end = (start + self.page_size).min(history.len());
        let page = &history[start..end];

        log::debug!(
            "[ADDRESS] {} history page [{}..{}) of {}",
            resolved.address,
            start,
            end,
            history.len()
        );

        if page.is_empty() {
            self.progress.set_progress(progress_key, 100.0);
            return Ok(Vec::new());
        }

        let mut transactions = Vec::with_capacity(page.len());
        for (i, entry) in page.iter().enumerate() {
            let tx = self
                .transactions
                .transaction(&entry.tx_hash, false, true)
                .await
                .map_err(|e| Error::upstream("transaction_get", e))?;
            transactions.push(tx);

            let percent = (i + 1) as f64 * 100.0 / page.len() as f64;
            self.progress.set_progress(progress_key, percent);
        }

        Ok(transactions)
    }
}

pub fn progress_key(address: &str) -> String {
    format!("address-{}", address)
}

/// Descending by height; mempool entries rank above every block. Stable, so
/// entries at the same height keep the server's order.
pub fn sort_recent_first(history: &mut [HistoryEntry]) {
    history.sort_by_key(|h| std::cmp::Reverse(effective_height(h)));
}

fn effective_height(entry: &HistoryEntry) -> i64 {
    if entry.is_confirmed() {
        entry.height
    } else {
        i64::MAX
    }
}

/// Index right after the cursor. An unknown cursor restarts at the top.
pub fn page_start(history: &[HistoryEntry], last_seen_txid: Option<&str>) -> usize {
    let Some(cursor) = last_seen_txid else {
        return 0;
    };

    match history.iter().position(|h| h.tx_hash == cursor) {
        Some(pos) => pos + 1,
        None => {
            log::debug!("[ADDRESS] cursor {} not in history, restarting", cursor);
            0
        }
    }
}
