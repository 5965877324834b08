//! Cryptographic primitives: domain-separated hashing, the field-literal
//! wire codec, and the invoice/receipt commitment schemes.
//!
//! Everything here is pure and synchronous. Failure modes are confined to
//! the literal decoder; derivation and generation cannot fail.

pub mod commitment;
pub mod hash;

pub use commitment::{
    derive_invoice_commitment, derive_receipt_commitment, generate_payment_secret, generate_salt,
};
pub use hash::{
    domain_hash, field_from_literal, field_to_bytes, field_to_literal, hash_to_field,
    FieldCodecError,
};
