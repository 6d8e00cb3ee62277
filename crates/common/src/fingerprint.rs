use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::descriptor::ComputationDescriptor;

/// Normalized, comparable digest of a descriptor, used for deduplication.
///
/// Computed as SHA-256 over a canonical rendering of the descriptor: the
/// descriptor is canonicalized first (see
/// [`ComputationDescriptor::canonicalize`]), then hashed field by field
/// with object keys in sorted order, so field ordering in the incoming
/// JSON never changes the fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(descriptor: &ComputationDescriptor) -> Fingerprint {
        let canonical = descriptor.canonicalize();
        // Serialization of descriptor values cannot fail; the Debug
        // rendering keeps the fingerprint deterministic if it ever does.
        let value = match serde_json::to_value(&canonical) {
            Ok(value) => value,
            Err(_) => Value::String(format!("{:?}", canonical)),
        };

        let mut hasher = Sha256::new();
        hash_value(&mut hasher, &value);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Fingerprint(digest)
    }
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => {
            hasher.update(b"b");
            hasher.update([*b as u8]);
        }
        Value::Number(n) => {
            hasher.update(b"#");
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hasher.update(s.as_bytes());
            hasher.update(b"|");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(hasher, item);
            }
            hasher.update(b"]");
        }
        Value::Object(map) => {
            hasher.update(b"{");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                hasher.update(key.as_bytes());
                hasher.update(b"=");
                hash_value(hasher, &map[key]);
            }
            hasher.update(b"}");
        }
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 6 bytes are enough for log correlation.
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
