pub mod address;
pub mod cache;
pub mod config;
pub mod electrum;
pub mod error;
pub mod esplora;
pub mod node;
pub mod progress;

use std::sync::Arc;

use crate::address::{AddressService, ScripthashQuery};
use crate::cache::MemoryCache;
use crate::config::AdapterConfig;
use crate::electrum::{ElectrumApi, ElectrumClient};
use crate::node::{ElectrumTransactionSource, ScriptAddressValidator};
use crate::progress::LoadingIndicators;

/// Handles created at process start.
pub struct Adapter {
    pub service: AddressService,
    pub electrum: ElectrumClient,
    pub progress: Arc<LoadingIndicators>,
}

/// Spawns the Electrum channel and wires the address service around it.
///
/// Must be called from inside a Tokio runtime.
pub fn setup_adapter(config: &AdapterConfig) -> Adapter {
    let electrum = ElectrumClient::spawn(config.electrum.clone());
    let api: Arc<dyn ElectrumApi> = Arc::new(electrum.clone());

    let cache = Arc::new(MemoryCache::new());
    let progress = Arc::new(LoadingIndicators::new());

    let service = AddressService::new(
        ScripthashQuery::new(api.clone(), cache, config.cache_ttl),
        Arc::new(ScriptAddressValidator::new(config.network)),
        Arc::new(ElectrumTransactionSource::new(api)),
        progress.clone(),
    )
    .with_page_size(config.page_size);

    log::info!(
        "[ADAPTER] electrum={} network={} cache_ttl={:?}",
        config.electrum.endpoint(),
        config.network,
        config.cache_ttl
    );

    Adapter {
        service,
        electrum,
        progress,
    }
}
