pub mod api;
pub mod client;
pub mod scripthash;
pub mod types;

#[cfg(test)]
pub mod mock_client;

pub use api::ElectrumApi;
pub use client::{log_events, ChannelEvent, ElectrumClient};
pub use types::{Balance, HeaderNotification, HistoryEntry, UtxoEntry};
