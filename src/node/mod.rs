//! Node-side collaborators: address validation and transaction lookup.

pub mod transaction;
pub mod validator;

use anyhow::Result;
use async_trait::async_trait;

use crate::esplora::Transaction;

pub use transaction::ElectrumTransactionSource;
pub use validator::ScriptAddressValidator;

/// Result of validating an address, mirroring `validateaddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub is_valid: bool,
    /// Normalized form; the input unchanged when invalid.
    pub address: String,
    /// Hex-encoded output script; empty when invalid.
    pub script_pub_key: String,
}

impl AddressInfo {
    pub fn invalid(address: &str) -> Self {
        Self {
            is_valid: false,
            address: address.to_string(),
            script_pub_key: String::new(),
        }
    }
}

#[async_trait]
pub trait AddressValidator: Send + Sync {
    /// `Err` only when the validator itself is unavailable. A malformed
    /// address is `Ok` with `is_valid == false`.
    async fn validate(&self, address: &str) -> Result<AddressInfo>;
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// `verbose` resolves input prevouts; `include_status` fills the
    /// block height/hash/time of the status.
    async fn transaction(&self, txid: &str, verbose: bool, include_status: bool) -> Result<Transaction>;
}
