use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::{Address, Network};

use crate::node::{AddressInfo, AddressValidator};

/// Validates addresses locally against one network, without a node round trip.
#[derive(Debug, Clone, Copy)]
pub struct ScriptAddressValidator {
    network: Network,
}

impl ScriptAddressValidator {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn check(&self, address: &str) -> AddressInfo {
        let parsed = Address::from_str(address.trim())
            .and_then(|unchecked| unchecked.require_network(self.network));

        match parsed {
            Ok(addr) => AddressInfo {
                is_valid: true,
                address: addr.to_string(),
                script_pub_key: hex::encode(addr.script_pubkey().as_bytes()),
            },
            Err(e) => {
                log::debug!("[VALIDATOR] rejecting {}: {}", address, e);
                AddressInfo::invalid(address)
            }
        }
    }
}

#[async_trait]
impl AddressValidator for ScriptAddressValidator {
    async fn validate(&self, address: &str) -> Result<AddressInfo> {
        Ok(self.check(address))
    }
}
