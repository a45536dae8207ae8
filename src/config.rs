use anyhow::{anyhow, Result};
use bitcoin::Network;
use std::time::Duration;

/// Default lifetime of cached scripthash results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2);

/// Transactions per history page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Connection settings for the Electrum channel.
#[derive(Debug, Clone)]
pub struct ElectrumConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Sent as the first `server.version` parameter.
    pub client_name: String,
    pub protocol_version: String,
    /// Delay between reconnect attempts.
    pub retry_period: Duration,
    pub request_timeout: Duration,
}

impl ElectrumConfig {
    /// Parses `ssl://host:port`, `tcp://host:port` or a bare `host:port`
    /// (which is treated as TLS). IPv6 hosts are written `[addr]:port`.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let (tls, rest) = if let Some(rest) = url.strip_prefix("ssl://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("tcp://") {
            (false, rest)
        } else {
            (true, url)
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("missing port in electrum url {}", url))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(anyhow!("missing host in electrum url {}", url));
        }
        let port = port.parse::<u16>()?;

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
            ..Self::default()
        })
    }

    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50001,
            tls: false,
            client_name: "mempool-v2".to_string(),
            protocol_version: "1.4".to_string(),
            retry_period: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything the adapter needs at process start.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub electrum: ElectrumConfig,
    pub network: Network,
    pub cache_ttl: Duration,
    pub page_size: usize,
}

impl AdapterConfig {
    pub fn new(electrum: ElectrumConfig, network: Network) -> Self {
        Self {
            electrum,
            network,
            cache_ttl: DEFAULT_CACHE_TTL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}
