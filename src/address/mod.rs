//! Esplora-style address queries answered from an Electrum backend.
//!
//! Every entry point resolves the address to its output script through the
//! [`AddressValidator`], derives the Electrum scripthash, and shapes the
//! scripthash results. An address the validator rejects yields zeroed stats
//! or an empty list, never an error.

pub mod history;
pub mod query;
pub mod stats;
pub mod utxo;

use std::sync::Arc;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::electrum::scripthash;
use crate::error::{Error, Result};
use crate::node::{AddressValidator, TransactionSource};
use crate::progress::ProgressReporter;

pub use query::ScripthashQuery;

/// A validated address and the scripthash it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: String,
    pub scripthash: String,
}

pub struct AddressService {
    query: ScripthashQuery,
    validator: Arc<dyn AddressValidator>,
    transactions: Arc<dyn TransactionSource>,
    progress: Arc<dyn ProgressReporter>,
    page_size: usize,
}

impl AddressService {
    pub fn new(
        query: ScripthashQuery,
        validator: Arc<dyn AddressValidator>,
        transactions: Arc<dyn TransactionSource>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            query,
            validator,
            transactions,
            progress,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `None` when the validator rejects the address.
    async fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>> {
        let info = self
            .validator
            .validate(address)
            .await
            .map_err(|e| Error::Validation(format!("{:#}", e)))?;

        if !info.is_valid {
            log::debug!("[ADDRESS] {} is not a valid address", address);
            return Ok(None);
        }

        Ok(Some(ResolvedAddress {
            scripthash: scripthash::encode(&info.script_pub_key)?,
            address: info.address,
        }))
    }
}

#[cfg(test)]
mod tests;
