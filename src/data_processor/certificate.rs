//! Certificate hashing: a stable SHA-256 over a canonicalized projection of
//! `securityDetails`, used to deduplicate certificates across scans.

use crate::utils::constants::VOLATILE_SECURITY_FIELDS;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Strips connection-specific fields and returns the canonical (sorted-key)
/// JSON object used both for hashing and for storage.
pub fn canonicalize(security_details: &Value) -> Value {
    let Value::Object(map) = security_details else {
        return security_details.clone();
    };

    let mut sorted = Map::new();
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for key in keys {
        if VOLATILE_SECURITY_FIELDS.contains(&key.as_str()) {
            continue;
        }
        sorted.insert(key.clone(), map[key].clone());
    }
    Value::Object(sorted)
}

/// Hashes the canonicalized `securityDetails` JSON.
#[must_use]
pub fn hash(security_details: &Value) -> String {
    let canonical = canonicalize(security_details);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_volatile_fields_before_hashing() {
        let a = json!({
            "protocol": "TLS 1.3",
            "subjectName": "example.com",
            "issuer": "Let's Encrypt",
            "validFrom": 1000,
            "validTo": 2000,
            "certificateId": 1,
        });
        let b = json!({
            "protocol": "TLS 1.2",
            "subjectName": "example.com",
            "issuer": "Let's Encrypt",
            "validFrom": 1000,
            "validTo": 2000,
            "certificateId": 2,
        });
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn distinguishes_different_certificates() {
        let a = json!({"subjectName": "a.example.com", "validFrom": 1, "validTo": 2});
        let b = json!({"subjectName": "b.example.com", "validFrom": 1, "validTo": 2});
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"subjectName": "x", "validFrom": 1, "validTo": 2});
        let b = json!({"validTo": 2, "validFrom": 1, "subjectName": "x"});
        assert_eq!(hash(&a), hash(&b));
    }
}
