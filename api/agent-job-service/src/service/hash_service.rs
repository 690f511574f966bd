use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the input document. `serde_json::Map` is ordered by key (the `preserve_order`
/// feature stays off), so equal documents hash equally whatever order the caller sent.
pub fn input_hash(input: &Map<String, Value>) -> Result<String, String> {
    let canonical =
        serde_json::to_string(input).map_err(|e| format!("input serialize failed: {e}"))?;
    Ok(sha256_hex(&canonical))
}
