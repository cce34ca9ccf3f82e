//! Redacting digest of request arguments.
//!
//! Audit events never persist raw arguments: values under secret-looking keys
//! are replaced before hashing, and only a short hash of the redacted form is
//! stored. The digest is stable across key ordering so identical requests
//! digest identically.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Key substrings whose values are always redacted.
const SENSITIVE_KEY_PARTS: &[&str] = &["password", "passwd", "secret", "token", "credential", "key"];

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lowered.contains(part))
}

/// Produce a redacted, order-independent digest of request arguments.
///
/// Returns a string of the form `sha256:<16 hex chars>`.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// let mut args = HashMap::new();
/// args.insert("table".to_string(), serde_json::json!("processes"));
/// let digest = toolgate_audit::digest_arguments(&args);
/// assert!(digest.starts_with("sha256:"));
/// ```
pub fn digest_arguments(
    arguments: &std::collections::HashMap<String, serde_json::Value>,
) -> String {
    // BTreeMap gives canonical key order for hashing.
    let redacted: BTreeMap<&str, serde_json::Value> = arguments
        .iter()
        .map(|(key, value)| {
            if is_sensitive_key(key) {
                (key.as_str(), serde_json::Value::String("[redacted]".into()))
            } else {
                (key.as_str(), value.clone())
            }
        })
        .collect();

    // Serialization of a string-keyed map cannot fail.
    let canonical =
        serde_json::to_string(&redacted).unwrap_or_else(|_| String::from("{}"));

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hasher.finalize();
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();

    format!("sha256:{}", &hex[..16])
}
