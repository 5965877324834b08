//! # Invoice & Receipt Commitments
//!
//! Two commitment schemes, both over the BN254 scalar field:
//!
//! ```text
//! invoice:  C_inv = H_m(merchant) + H_a(amount) + H_s(salt)      (sum in Fr)
//! receipt:  C_rec = H_c(secret ‖ H_k(salt))                       (two-stage)
//! ```
//!
//! The invoice commitment is *additive* on purpose: each term is an
//! independent domain-separated hash, so a payer holding only the public
//! link parameters (merchant, amount, salt) recomputes the exact on-chain
//! value without ever learning a private linking key. The sum is
//! order-independent, which the chain-side verifier relies on.
//!
//! Donation invoices pin the amount term to zero: the commitment binds the
//! invoice's identity (merchant, salt), not the donated amount, so any
//! contribution satisfies the same link. Settlement records the actual
//! transferred amount separately. Callers recomputing a donation
//! commitment MUST pass zero here — the kind-aware helper lives on
//! [`crate::invoice::InvoiceKind`].
//!
//! The receipt commitment is binding (changing the secret changes the
//! hash) and hiding (without the salt, the commitment reveals nothing
//! about the secret). The same value appears in the payer-side and
//! merchant-side receipt records of one settle transition — that equality
//! is the protocol's core linkage invariant.
//!
//! Everything in this module is a pure, total function. Malformed inputs
//! are the caller's problem; there are no error paths here.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use rand::RngCore;

use super::hash::{field_to_bytes, hash_to_field};

// Domain registry. One context per hash purpose, never reused.
const DOMAIN_INVOICE_MERCHANT: &str = "veil/invoice/merchant";
const DOMAIN_INVOICE_AMOUNT: &str = "veil/invoice/amount";
const DOMAIN_INVOICE_SALT: &str = "veil/invoice/salt";
const DOMAIN_RECEIPT_KEY: &str = "veil/receipt/key";
const DOMAIN_RECEIPT_COMMIT: &str = "veil/receipt/commit";

/// Derive the public invoice commitment from its three link parameters.
///
/// Deterministic, and commutative in its three terms — the verifier may
/// fold them in any order.
pub fn derive_invoice_commitment(merchant: &str, amount: u64, salt: &Fr) -> Fr {
    let term_merchant = hash_to_field(DOMAIN_INVOICE_MERCHANT, merchant.as_bytes());
    let term_amount = hash_to_field(DOMAIN_INVOICE_AMOUNT, &amount.to_le_bytes());
    let term_salt = hash_to_field(DOMAIN_INVOICE_SALT, &field_to_bytes(salt));
    term_merchant + term_amount + term_salt
}

/// Derive the receipt commitment linking both sides of one payment.
///
/// Stage one hashes the salt into a key scalar; stage two commits the
/// payment secret under that scalar. The secret never leaves the client
/// in the clear — only this commitment appears on-chain.
pub fn derive_receipt_commitment(secret: &Fr, salt: &Fr) -> Fr {
    let key = hash_to_field(DOMAIN_RECEIPT_KEY, &field_to_bytes(salt));

    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&field_to_bytes(secret));
    preimage[32..].copy_from_slice(&field_to_bytes(&key));
    hash_to_field(DOMAIN_RECEIPT_COMMIT, &preimage)
}

/// Generate a fresh invoice salt: 128 cryptographically random bits
/// mapped into the field.
///
/// The 2^-128 collision bound on salts is the system's sole defense
/// against invoice-hash guessing, which is why this goes through the OS
/// entropy source and nothing weaker.
pub fn generate_salt() -> Fr {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Fr::from_le_bytes_mod_order(&bytes)
}

/// Generate a fresh payment secret: a full-width random field element,
/// scoped to a single payment attempt.
pub fn generate_payment_secret() -> Fr {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Fr::from_le_bytes_mod_order(&bytes)
}
