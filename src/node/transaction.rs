use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bitcoin::Amount;
use serde::Deserialize;
use tokio::time::Instant;

use crate::electrum::ElectrumApi;
use crate::esplora::{Transaction, TxStatus, Vin, Vout};
use crate::node::TransactionSource;

/// Serves transactions from the Electrum server's verbose
/// `blockchain.transaction.get`, reshaped for Esplora callers.
///
/// The chain tip used for block heights is read before the transaction so a
/// block found in between can only make the height stale, never ahead of the
/// tip. One tip read is shared by every lookup within [`TIP_TTL`].
pub struct ElectrumTransactionSource {
    electrum: Arc<dyn ElectrumApi>,
    tip: Mutex<Option<(Instant, u32)>>,
}

/// How long a `blockchain.headers.subscribe` result is reused.
pub const TIP_TTL: Duration = Duration::from_secs(1);

impl ElectrumTransactionSource {
    pub fn new(electrum: Arc<dyn ElectrumApi>) -> Self {
        Self {
            electrum,
            tip: Mutex::new(None),
        }
    }

    async fn tip(&self) -> Result<u32> {
        let cached = self.tip.lock().ok().and_then(|guard| *guard);
        if let Some((read_at, height)) = cached {
            if read_at.elapsed() < TIP_TTL {
                return Ok(height);
            }
        }

        let height = self.electrum.headers_subscribe().await?.height;
        log::trace!("[TX] chain tip {}", height);
        if let Ok(mut guard) = self.tip.lock() {
            *guard = Some((Instant::now(), height));
        }
        Ok(height)
    }

    async fn fetch_verbose(&self, txid: &str) -> Result<VerboseTx> {
        let raw = self.electrum.transaction_get(txid, true).await?;
        serde_json::from_value(raw).map_err(|e| anyhow!("malformed verbose transaction {}: {}", txid, e))
    }

    fn status(tx: &VerboseTx, tip: Option<u32>) -> TxStatus {
        let confirmations = tx.confirmations.unwrap_or(0);
        if confirmations == 0 {
            return TxStatus::default();
        }
        let Some(tip) = tip else {
            return TxStatus {
                confirmed: true,
                ..TxStatus::default()
            };
        };

        TxStatus {
            confirmed: true,
            block_height: Some(block_height(tip, confirmations)),
            block_hash: tx.blockhash.clone(),
            block_time: tx.blocktime,
        }
    }
}

#[async_trait]
impl TransactionSource for ElectrumTransactionSource {
    async fn transaction(&self, txid: &str, verbose: bool, include_status: bool) -> Result<Transaction> {
        log::trace!("[TX] fetching {} (verbose={}, status={})", txid, verbose, include_status);

        let tip = if include_status { Some(self.tip().await?) } else { None };
        let tx = self.fetch_verbose(txid).await?;
        let status = Self::status(&tx, tip);

        let mut vin = Vec::with_capacity(tx.vin.len());
        for input in &tx.vin {
            let mut converted = input.to_esplora();
            if verbose && !converted.is_coinbase {
                let parent = self.fetch_verbose(&converted.txid).await?;
                let prevout = parent
                    .vout
                    .iter()
                    .find(|o| o.n == converted.vout)
                    .ok_or_else(|| anyhow!("prevout {}:{} not found", converted.txid, converted.vout))?;
                converted.prevout = Some(prevout.to_esplora()?);
            }
            vin.push(converted);
        }

        let vout = tx
            .vout
            .iter()
            .map(VerboseVout::to_esplora)
            .collect::<Result<Vec<_>>>()?;

        Ok(Transaction {
            txid: tx.txid,
            version: tx.version,
            locktime: tx.locktime,
            size: tx.size,
            weight: tx.weight.unwrap_or(tx.size * 4),
            vin,
            vout,
            status,
        })
    }
}

/// Confirmations count the including block, so one confirmation means the tip.
fn block_height(tip: u32, confirmations: u32) -> u32 {
    (tip + 1).saturating_sub(confirmations)
}

// =====================================================================
// Node verbose JSON
// =====================================================================

#[derive(Debug, Deserialize)]
struct VerboseTx {
    txid: String,
    version: i32,
    locktime: u32,
    size: u32,
    weight: Option<u32>,
    vin: Vec<VerboseVin>,
    vout: Vec<VerboseVout>,
    blockhash: Option<String>,
    confirmations: Option<u32>,
    blocktime: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VerboseVin {
    txid: Option<String>,
    vout: Option<u32>,
    coinbase: Option<String>,
    #[serde(rename = "scriptSig")]
    script_sig: Option<ScriptHex>,
    txinwitness: Option<Vec<String>>,
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct VerboseVout {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: VerboseScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptHex {
    hex: String,
}

#[derive(Debug, Deserialize)]
struct VerboseScriptPubKey {
    hex: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
}

impl VerboseVin {
    fn to_esplora(&self) -> Vin {
        let is_coinbase = self.coinbase.is_some();
        Vin {
            txid: self
                .txid
                .clone()
                .unwrap_or_else(|| "0".repeat(64)),
            vout: self.vout.unwrap_or(u32::MAX),
            is_coinbase,
            scriptsig: match (&self.script_sig, &self.coinbase) {
                (Some(s), _) => s.hex.clone(),
                (None, Some(cb)) => cb.clone(),
                (None, None) => String::new(),
            },
            witness: self.txinwitness.clone(),
            sequence: self.sequence,
            prevout: None,
        }
    }
}

impl VerboseVout {
    fn to_esplora(&self) -> Result<Vout> {
        let value = Amount::from_btc(self.value)
            .map_err(|e| anyhow!("bad output value {}: {}", self.value, e))?;
        Ok(Vout {
            scriptpubkey: self.script_pub_key.hex.clone(),
            scriptpubkey_address: self.script_pub_key.address.clone(),
            scriptpubkey_type: esplora_script_type(&self.script_pub_key.kind).to_string(),
            value: value.to_sat(),
        })
    }
}

/// Maps node script type names onto Esplora's.
fn esplora_script_type(kind: &str) -> &str {
    match kind {
        "pubkeyhash" => "p2pkh",
        "scripthash" => "p2sh",
        "witness_v0_keyhash" => "v0_p2wpkh",
        "witness_v0_scripthash" => "v0_p2wsh",
        "witness_v1_taproot" => "v1_p2tr",
        "pubkey" => "p2pk",
        "nulldata" => "op_return",
        "multisig" => "multisig",
        _ => "unknown",
    }
}
