//! Request fingerprinting for the idempotent import endpoint.
//!
//! A fingerprint is the SHA-256 of the canonical JSON rendering of the
//! request payload. Canonical means object keys sorted recursively with
//! `,`/`:` separators, so the same logical payload always hashes the same.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use recon_core::error::AppError;

/// Render a JSON value canonically: sorted object keys, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON rendering.
        other => out.push_str(&other.to_string()),
    }
}

/// Compute the hex SHA-256 fingerprint of a serializable payload.
pub fn request_fingerprint<T: Serialize>(payload: &T) -> Result<String, AppError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to serialize payload: {}", e)))?;
    let canonical = canonical_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
