//! Cache key derivation.
//!
//! Keys are SHA-256 digests of a canonical JSON rendering of the request's
//! type, payload and config. Object keys are sorted at every depth, so two
//! requests that differ only in map insertion order share a key, and the key
//! is stable across restarts. Collisions are not detected.

use std::fmt::Write;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::generation::GenerationRequest;

// == Derive Key ==
/// Returns `"<type>:<sha256 hex>"` for a request.
pub fn derive_key(request: &GenerationRequest) -> String {
    let mut canonical = String::from("{\"config\":");
    write_canonical(&request.config, &mut canonical);
    canonical.push_str(",\"payload\":");
    write_canonical(&request.payload, &mut canonical);
    canonical.push_str(",\"type\":");
    write_canonical(&Value::String(request.request_type.clone()), &mut canonical);
    canonical.push('}');

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{}:{:x}", request.request_type, hasher.finalize())
}

// == Canonical JSON ==
/// Compact JSON with object keys sorted bytewise at every level.
///
/// Does not depend on how `serde_json::Map` orders its keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a JSON string value yields the escaped literal
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        leaf => {
            let _ = write!(out, "{}", leaf);
        }
    }
}
