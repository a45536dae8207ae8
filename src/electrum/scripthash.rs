use bitcoin::hashes::{sha256, Hash};
use bitcoin::Script;

use crate::error::Result;

/// Convert script bytes to electrum scripthash hex (little endian).
///
/// Electrum uses the sha256 hash of the script, reversed, represented as hex.
pub fn from_script(script: &Script) -> String {
    from_bytes(script.as_bytes())
}

/// Same as [`from_script`], starting from the hex form handed out by the
/// address validator. Malformed hex is rejected instead of truncated.
pub fn encode(script_hex: &str) -> Result<String> {
    let bytes = hex::decode(script_hex)?;
    Ok(from_bytes(&bytes))
}

fn from_bytes(bytes: &[u8]) -> String {
    let hash = sha256::Hash::hash(bytes);
    let mut bytes = hash.to_byte_array();
    bytes.reverse();
    hex::encode(bytes)
}
