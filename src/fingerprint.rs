//! Step fingerprints
//!
//! A fingerprint identifies one step of one pipeline definition under one
//! parameter set. It is the cache key and the prefix of both blob names.
//!
//! Inputs, each length-prefixed so that no two input tuples share an encoding:
//! - Namespace (pipeline definition identity)
//! - Parameters (sorted by name, canonical literal form)
//! - Step index
//! - Step content

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::executor::Parameters;

/// Number of hex characters kept from the SHA-256 digest (64 bits)
pub const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FINGERPRINT_LEN {
            return Err(format!(
                "fingerprint must be {} characters, got {}",
                FINGERPRINT_LEN,
                s.len()
            ));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(format!("fingerprint must be lowercase hex: {}", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field);
}

/// Compute the fingerprint of a step
///
/// Pure and deterministic. Parameter order does not matter, parameter values do:
/// every step of a run shares the same parameter set, so changing any value
/// changes every fingerprint of the run.
pub fn fingerprint(
    namespace: &str,
    parameters: &Parameters,
    step_index: usize,
    step_content: &str,
) -> Fingerprint {
    let mut hasher = Sha256::new();

    update_field(&mut hasher, namespace.as_bytes());

    // BTreeMap iteration is sorted by name
    hasher.update((parameters.len() as u64).to_le_bytes());
    for (name, value) in parameters {
        update_field(&mut hasher, name.as_bytes());
        update_field(&mut hasher, value.to_string().as_bytes());
    }

    update_field(&mut hasher, step_index.to_string().as_bytes());
    update_field(&mut hasher, step_content.as_bytes());

    let hash = hex::encode(hasher.finalize());
    Fingerprint(hash[..FINGERPRINT_LEN].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Value;

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let p = params(&[("a", Value::Int(1))]);
        let fp1 = fingerprint("ns1", &p, 0, "x = 1");
        let fp2 = fingerprint("ns1", &p, 0, "x = 1");

        assert_eq!(fp1, fp2);
        assert_eq!(fp1.as_str().len(), FINGERPRINT_LEN);
        assert!(fp1.as_str().parse::<Fingerprint>().is_ok());
    }

    #[test]
    fn test_fingerprint_changes_with_each_input() {
        let p = params(&[("a", Value::Int(1))]);
        let base = fingerprint("ns1", &p, 0, "x = 1");

        assert_ne!(base, fingerprint("ns2", &p, 0, "x = 1"));
        assert_ne!(base, fingerprint("ns1", &params(&[("a", Value::Int(2))]), 0, "x = 1"));
        assert_ne!(base, fingerprint("ns1", &p, 1, "x = 1"));
        assert_ne!(base, fingerprint("ns1", &p, 0, "x = 2"));
    }

    #[test]
    fn test_fingerprint_index_sensitive() {
        let p = Parameters::new();
        assert_ne!(
            fingerprint("ns1", &p, 3, "y = x + 1"),
            fingerprint("ns1", &p, 4, "y = x + 1")
        );
    }

    #[test]
    fn test_fingerprint_parameter_order_independent() {
        let mut p1 = Parameters::new();
        p1.insert("a".to_string(), Value::Int(1));
        p1.insert("b".to_string(), Value::Str("x".to_string()));

        let mut p2 = Parameters::new();
        p2.insert("b".to_string(), Value::Str("x".to_string()));
        p2.insert("a".to_string(), Value::Int(1));

        assert_eq!(fingerprint("ns", &p1, 0, "a"), fingerprint("ns", &p2, 0, "a"));
    }

    #[test]
    fn test_fingerprint_value_type_sensitive() {
        let as_int = params(&[("n", Value::Int(1))]);
        let as_str = params(&[("n", Value::Str("1".to_string()))]);
        let as_float = params(&[("n", Value::Float(1.0))]);

        let fp_int = fingerprint("ns", &as_int, 0, "n");
        assert_ne!(fp_int, fingerprint("ns", &as_str, 0, "n"));
        assert_ne!(fp_int, fingerprint("ns", &as_float, 0, "n"));
    }

    #[test]
    fn test_fingerprint_no_concatenation_ambiguity() {
        let p = Parameters::new();
        assert_ne!(fingerprint("ab", &p, 0, "c"), fingerprint("a", &p, 0, "bc"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!("ABCDEF0123456789".parse::<Fingerprint>().is_err());
        assert!("abcdef0123456789".parse::<Fingerprint>().is_ok());
    }
}
