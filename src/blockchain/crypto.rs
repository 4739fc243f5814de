use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data` as a lowercase hexadecimal string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Renders a JSON value in canonical form
///
/// serde_json's `Map` is ordered by key, so every object is emitted with its
/// keys sorted no matter in which order they were inserted. Output is
/// compact (no whitespace between tokens).
pub fn canonical_json(value: &Value) -> String {
    // Re-collecting rebuilds every map, so ordering holds even for values
    // produced by a crate that enables `preserve_order`.
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
