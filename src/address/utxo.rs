use crate::address::AddressService;
use crate::error::{Error, Result};
use crate::esplora::Utxo;

impl AddressService {
    /// Unspent outputs of `address`, each with its transaction's status.
    ///
    /// Electrum's `listunspent` has no confirmation status, so every UTXO
    /// costs one transaction fetch. Output order follows the server's list.
    pub async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let Some(resolved) = self.resolve(address).await? else {
            return Ok(Vec::new());
        };

        let unspent = self.query.utxos(&resolved.scripthash).await?;
        log::debug!("[ADDRESS] {} has {} utxos", resolved.address, unspent.len());

        let mut utxos = Vec::with_capacity(unspent.len());
        for entry in unspent {
            let tx = self
                .transactions
                .transaction(&entry.tx_hash, false, true)
                .await
                .map_err(|e| Error::upstream("transaction_get", e))?;

            utxos.push(Utxo {
                txid: entry.tx_hash,
                vout: entry.tx_pos,
                status: tx.status,
                value: entry.value,
            });
        }

        Ok(utxos)
    }
}
