//! # Hashing & Field Plumbing
//!
//! Everything commitment-shaped in VEIL reduces to two operations: a
//! domain-separated BLAKE3 hash, and a mapping from hash output into the
//! BN254 scalar field. Both live here.
//!
//! Domain separation uses BLAKE3's `derive_key` mode — a distinct internal
//! IV per context string — so a merchant-address hash and a salt hash can
//! never collide even on identical input bytes. Prepending tag bytes by
//! hand does not give that guarantee; `derive_key` does, by construction.
//!
//! ## Field literals
//!
//! Mapping values, transition inputs, and execution outputs travel as
//! text. A field element is rendered as its canonical little-endian byte
//! encoding in hex with a `field` suffix, e.g. `1a2b…90field`. The decoder
//! is strict: wrong length, bad hex, or a non-canonical value (≥ the field
//! modulus) are distinct errors, never silently reduced.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use thiserror::Error;

/// Suffix carried by every field literal on the wire.
const FIELD_SUFFIX: &str = "field";

/// Errors from decoding a field literal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldCodecError {
    /// The literal does not end in `field`.
    #[error("missing 'field' suffix in literal {0:?}")]
    MissingSuffix(String),

    /// The hex body could not be decoded.
    #[error("invalid hex in field literal: {0}")]
    InvalidHex(String),

    /// The decoded byte string has the wrong length.
    #[error("field literal must encode 32 bytes, got {0}")]
    InvalidLength(usize),

    /// The bytes decode to a value outside the canonical field range.
    #[error("field literal is not a canonical BN254 scalar")]
    NonCanonical,
}

/// Compute a domain-separated BLAKE3 hash.
///
/// `context` strings are compile-time constants of the form
/// `"veil/<area>/<purpose>"`; see [`crate::crypto::commitment`] for the
/// full registry of domains in use.
pub fn domain_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash arbitrary bytes into a BN254 scalar under a domain context.
///
/// Hash-and-reduce: 256 uniform bits reduced modulo the ~254-bit field
/// order leaves a bias below 2^-128, which is noise. This is the standard
/// arkworks construction and the only way field elements are ever derived
/// from protocol data in this crate.
pub fn hash_to_field(context: &str, data: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(&domain_hash(context, data))
}

/// Canonical little-endian byte encoding of a field element.
pub fn field_to_bytes(value: &Fr) -> [u8; 32] {
    let mut buf = Vec::with_capacity(32);
    value
        .serialize_compressed(&mut buf)
        .expect("Fr serialization into a Vec cannot fail");
    let mut out = [0u8; 32];
    out.copy_from_slice(&buf);
    out
}

/// Render a field element as a wire literal: `<hex>field`.
pub fn field_to_literal(value: &Fr) -> String {
    format!("{}{}", hex::encode(field_to_bytes(value)), FIELD_SUFFIX)
}

/// Parse a wire literal back into a field element. Strict — see the
/// module docs for the error taxonomy.
pub fn field_from_literal(literal: &str) -> Result<Fr, FieldCodecError> {
    let body = literal
        .strip_suffix(FIELD_SUFFIX)
        .ok_or_else(|| FieldCodecError::MissingSuffix(literal.to_string()))?;

    let bytes = hex::decode(body).map_err(|e| FieldCodecError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(FieldCodecError::InvalidLength(bytes.len()));
    }

    // deserialize_compressed rejects values >= the modulus, which is
    // exactly the canonicity check we want.
    Fr::deserialize_compressed(bytes.as_slice()).map_err(|_| FieldCodecError::NonCanonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use ark_std::test_rng;

    #[test]
    fn domain_hash_deterministic() {
        let a = domain_hash("veil/test", b"payload");
        let b = domain_hash("veil/test", b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn domains_separate() {
        // Same bytes, different contexts. If these ever collide the
        // commitment scheme is broken at the root.
        let data = b"same data";
        assert_ne!(domain_hash("veil/a", data), domain_hash("veil/b", data));
    }

    #[test]
    fn hash_to_field_deterministic() {
        let a = hash_to_field("veil/test", b"tx");
        let b = hash_to_field("veil/test", b"tx");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_to_field_distinct_inputs() {
        assert_ne!(
            hash_to_field("veil/test", b"input A"),
            hash_to_field("veil/test", b"input B")
        );
    }

    #[test]
    fn literal_round_trip() {
        let mut rng = test_rng();
        for _ in 0..16 {
            let v = Fr::rand(&mut rng);
            let literal = field_to_literal(&v);
            assert!(literal.ends_with("field"));
            assert_eq!(field_from_literal(&literal).unwrap(), v);
        }
    }

    #[test]
    fn literal_rejects_missing_suffix() {
        let v = Fr::from(7u64);
        let bare = hex::encode(field_to_bytes(&v));
        assert!(matches!(
            field_from_literal(&bare),
            Err(FieldCodecError::MissingSuffix(_))
        ));
    }

    #[test]
    fn literal_rejects_bad_hex() {
        assert!(matches!(
            field_from_literal("zzzzfield"),
            Err(FieldCodecError::InvalidHex(_))
        ));
    }

    #[test]
    fn literal_rejects_short_body() {
        assert_eq!(
            field_from_literal("abcdfield"),
            Err(FieldCodecError::InvalidLength(2))
        );
    }

    #[test]
    fn literal_rejects_non_canonical() {
        // All-ones is comfortably above the BN254 scalar modulus.
        let literal = format!("{}field", "ff".repeat(32));
        assert_eq!(field_from_literal(&literal), Err(FieldCodecError::NonCanonical));
    }
}
