use anyhow::Result;
use bitcoin::Network;
use clap::{Parser, Subcommand};
use std::time::Duration;

use electrum_address_adapter::config::{AdapterConfig, ElectrumConfig};
use electrum_address_adapter::electrum::log_events;
use electrum_address_adapter::setup_adapter;

#[derive(Subcommand, Clone, Debug)]
enum Query {
    /// Chain and mempool stats
    Stats { address: String },
    /// One page of transactions, most recent first
    Txs {
        address: String,
        /// Last txid of the previous page
        #[arg(long)]
        after: Option<String>,
    },
    /// Unspent outputs with confirmation status
    Utxos { address: String },
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "bitcoin")]
    network: Network,

    #[arg(long, default_value = "ssl://electrum.blockstream.info:50002")]
    electrum_url: String,

    #[arg(long, default_value_t = 2)]
    cache_ttl_secs: u64,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    query: Query,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut electrum = ElectrumConfig::from_url(&args.electrum_url)?;
    electrum.request_timeout = Duration::from_secs(args.timeout_secs);

    let config = AdapterConfig::new(electrum, args.network)
        .with_cache_ttl(Duration::from_secs(args.cache_ttl_secs));

    let adapter = setup_adapter(&config);

    tokio::spawn(log_events(adapter.electrum.events()));

    let output = match &args.query {
        Query::Stats { address } => {
            serde_json::to_string_pretty(&adapter.service.address_stats(address).await?)?
        }
        Query::Txs { address, after } => {
            let txs = adapter
                .service
                .address_transactions(address, after.as_deref())
                .await?;
            serde_json::to_string_pretty(&txs)?
        }
        Query::Utxos { address } => {
            serde_json::to_string_pretty(&adapter.service.address_utxos(address).await?)?
        }
    };

    println!("{}", output);
    Ok(())
}
