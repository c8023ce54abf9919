//! Deterministic detector identity.
//!
//! A detector without a manual `id` is identified by a short hash over its
//! type and its *normalized* params: params equal to the type's registered
//! default are dropped first, so spelling out a default never changes the id.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::models::Params;

/// Number of hex characters kept from the SHA-256 digest.
pub const DETECTOR_ID_LEN: usize = 8;

/// Registered defaults for known detector types.
///
/// The table is static so ids are identical across processes and releases.
pub fn default_params(kind: &str) -> Option<Params> {
    let defaults = match kind {
        "threshold" => json!({ "operator": "outside" }),
        "percent_change" => json!({ "window": 1, "max_percent": 20.0, "min_points": 1 }),
        "missing_data" => json!({}),
        "mad" | "zscore" => json!({
            "window_size": "30 days",
            "n_sigma": 3.0,
            "use_weighted": true,
            "weights_type": "exponential",
            "exp_decay_factor": 0.1,
        }),
        _ => return None,
    };
    match defaults {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Drop every param whose value equals the registered default for `kind`.
///
/// Unknown types are returned unchanged.
pub fn normalize_params(kind: &str, params: &Params) -> Params {
    let Some(defaults) = default_params(kind) else {
        return params.clone();
    };
    params
        .iter()
        .filter(|(key, value)| {
            defaults
                .get(key.as_str())
                .map_or(true, |default| !values_equal(value, default))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Compute the deterministic id for a detector without a manual id.
pub fn resolve_detector_id(kind: &str, params: &Params) -> String {
    let normalized = normalize_params(kind, params);
    let canonical = canonical_json(&Value::Object(normalized));
    let digest = Sha256::digest(format!("{kind}:{canonical}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(DETECTOR_ID_LEN);
    hex
}

/// Whether `s` is a valid metric name or manual detector id.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Compact JSON with object keys sorted at every depth.
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
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Equality where numbers compare by value (`3` equals `3.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
