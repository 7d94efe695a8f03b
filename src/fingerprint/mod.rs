//! Cache keys for (callable, arguments) pairs.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a canonical encoding of the
//! callable name and its argument list. Every JSON node is written with a
//! one-byte type tag, containers and strings carry a length prefix, and
//! object members are fed in key order, so structurally equal arguments
//! always hash the same regardless of how their maps were built.
//!
//! Numbers are encoded by their JSON text, which keeps `1` and `1.0`
//! distinct the same way `serde_json::Value` equality does.
//!
//! Memoization is only sound for deterministic callables. Collisions are not
//! detected.

use crate::task::CallableRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_OBJECT: u8 = 5;

/// Deterministic identity of one call, used as the result cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of `callable` applied to `args`.
    ///
    /// # Example
    ///
    /// ```
    /// use memopool::fingerprint::Fingerprint;
    /// use memopool::task::CallableRef;
    /// use serde_json::json;
    ///
    /// let fib = CallableRef::new("fib");
    /// let a = Fingerprint::of(&fib, &[json!({"n": 30, "trace": false})]);
    /// let b = Fingerprint::of(&fib, &[json!({"trace": false, "n": 30})]);
    /// assert_eq!(a, b);
    /// ```
    #[must_use]
    pub fn of(callable: &CallableRef, args: &[Value]) -> Self {
        let mut hasher = Sha256::new();
        write_str(&mut hasher, callable.name());
        write_len(&mut hasher, args.len());
        for arg in args {
            write_value(&mut hasher, arg);
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update(u64::try_from(len).unwrap_or(u64::MAX).to_le_bytes());
}

fn write_str(hasher: &mut Sha256, s: &str) {
    write_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn write_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([TAG_NULL]),
        Value::Bool(b) => hasher.update([TAG_BOOL, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update([TAG_NUMBER]);
            write_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update([TAG_STRING]);
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update([TAG_ARRAY]);
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([TAG_OBJECT]);
            write_len(hasher, map.len());
            let mut members: Vec<_> = map.iter().collect();
            members.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (key, member) in members {
                write_str(hasher, key);
                write_value(hasher, member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fp(name: &str, args: &[Value]) -> Fingerprint {
        Fingerprint::of(&CallableRef::new(name), args)
    }

    #[test]
    fn test_same_call_same_key() {
        assert_eq!(fp("add", &[json!(1), json!(2)]), fp("add", &[json!(1), json!(2)]));
    }

    #[test]
    fn test_callable_distinguishes() {
        assert_ne!(fp("add", &[json!(1)]), fp("sub", &[json!(1)]));
    }

    #[test]
    fn test_argument_order_matters() {
        assert_ne!(fp("f", &[json!(1), json!(2)]), fp("f", &[json!(2), json!(1)]));
    }

    #[test]
    fn test_object_key_order_ignored() {
        let mut a = serde_json::Map::new();
        a.insert("x".into(), json!(1));
        a.insert("y".into(), json!([true, null]));
        let mut b = serde_json::Map::new();
        b.insert("y".into(), json!([true, null]));
        b.insert("x".into(), json!(1));

        assert_eq!(fp("f", &[Value::Object(a)]), fp("f", &[Value::Object(b)]));
    }

    #[test]
    fn test_type_tags_separate_lookalikes() {
        assert_ne!(fp("f", &[json!("1")]), fp("f", &[json!(1)]));
        assert_ne!(fp("f", &[json!(null)]), fp("f", &[json!(false)]));
        assert_ne!(fp("f", &[json!([])]), fp("f", &[json!({})]));
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_aliasing() {
        assert_ne!(fp("f", &[json!("ab"), json!("c")]), fp("f", &[json!("a"), json!("bc")]));
        assert_ne!(fp("fa", &[json!("b")]), fp("f", &[json!("ab")]));
        assert_ne!(fp("f", &[json!([1, 2])]), fp("f", &[json!([1]), json!(2)]));
    }

    #[test]
    fn test_integer_and_float_differ() {
        assert_ne!(fp("f", &[json!(1)]), fp("f", &[json!(1.0)]));
    }

    #[test]
    fn test_no_args() {
        assert_eq!(fp("now", &[]), fp("now", &[]));
        assert_ne!(fp("now", &[]), fp("now", &[json!(null)]));
    }

    #[test]
    fn test_encoding_is_stable() {
        // Pins the encoding: tags plus little-endian u64 length prefixes.
        assert_eq!(
            fp("add", &[json!(2), json!(["x", true, null])]).to_hex(),
            "9519e407fa141d9527886bc46c83dc4f1d08d1723565f355601b7ad2dbd8c81f"
        );
    }

    #[test]
    fn test_hex_display() {
        let key = fp("f", &[json!(42)]);
        let hex = key.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hex, key.to_hex());
    }
}
