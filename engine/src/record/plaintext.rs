//! # Record Plaintext Parsing
//!
//! Decrypted records arrive from the wallet as `{ key: value, … }` text
//! blocks. An earlier client matched substrings against that text and
//! defaulted missing fields to zero, which turned wallet format drift into
//! silently wrong amounts. This module replaces that with a real parser:
//! a tokenizer for the block syntax, typed field extraction, and a tagged
//! classification into the record shapes the invoice program produces.
//!
//! ```text
//! { owner: veil1…, amount: 1500000u64, asset: primary }              balance
//! { owner: veil1…, salt: …field, commitment: …field, amount: …u64 }  invoice
//! { owner: veil1…, commitment: …field, amount: …u64, role: payer }   receipt
//! ```
//!
//! Every failure is a distinct [`PlaintextError`]; there are no defaults.
//! Records that tokenize but match no known shape classify as
//! [`RecordData::Unknown`] with their key set preserved for diagnostics —
//! unknown is an honest answer, zero is not.

use ark_bn254::Fr;
use thiserror::Error;

use crate::crypto::hash::{field_from_literal, FieldCodecError};
use crate::invoice::types::AssetKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from tokenizing or extracting fields of a plaintext block.
#[derive(Debug, Error)]
pub enum PlaintextError {
    /// The text is not wrapped in `{ … }`.
    #[error("plaintext is not a braced block")]
    NotABlock,

    /// An entry has no `key: value` shape.
    #[error("malformed entry {0:?} (expected 'key: value')")]
    MalformedEntry(String),

    /// The same key appears twice.
    #[error("duplicate key {0:?}")]
    DuplicateKey(String),

    /// A required field is absent.
    #[error("missing required field {0:?}")]
    MissingField(String),

    /// An amount field is not a `<digits>u64` literal.
    #[error("field {field:?} is not a u64 literal: {value:?}")]
    InvalidAmount {
        /// The field being extracted.
        field: String,
        /// The raw value found.
        value: String,
    },

    /// A boolean field is neither `true` nor `false`.
    #[error("field {field:?} is not a boolean: {value:?}")]
    InvalidBool {
        /// The field being extracted.
        field: String,
        /// The raw value found.
        value: String,
    },

    /// A field-element literal failed to decode.
    #[error("field element decode failed: {0}")]
    FieldCodec(#[from] FieldCodecError),

    /// A receipt record carries a role other than payer/merchant.
    #[error("unknown receipt role {0:?}")]
    UnknownRole(String),

    /// A balance record names an asset the client does not know.
    #[error("unknown asset token {0:?} in record")]
    UnknownRecordAsset(String),
}

// ---------------------------------------------------------------------------
// KvBlock
// ---------------------------------------------------------------------------

/// A tokenized `{ key: value, … }` block with typed extractors.
///
/// Shared by record classification and on-chain state parsing
/// ([`crate::invoice::types::OnChainInvoiceState`]). Values are opaque
/// tokens at this layer; typing happens in the `require_*` extractors.
#[derive(Debug, Clone)]
pub struct KvBlock {
    entries: Vec<(String, String)>,
}

impl KvBlock {
    /// Tokenize a block. Rejects non-braced input, entries without a
    /// colon, and duplicate keys.
    pub fn parse(text: &str) -> Result<Self, PlaintextError> {
        let trimmed = text.trim();
        let interior = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or(PlaintextError::NotABlock)?;

        let mut entries: Vec<(String, String)> = Vec::new();
        for raw in interior.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (key, value) = raw
                .split_once(':')
                .ok_or_else(|| PlaintextError::MalformedEntry(raw.to_string()))?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(PlaintextError::MalformedEntry(raw.to_string()));
            }
            if entries.iter().any(|(k, _)| k == key) {
                return Err(PlaintextError::DuplicateKey(key.to_string()));
            }
            entries.push((key.to_string(), value.to_string()));
        }

        Ok(Self { entries })
    }

    /// The keys present, in block order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a raw value or fail with [`PlaintextError::MissingField`].
    pub fn require(&self, key: &str) -> Result<&str, PlaintextError> {
        self.get(key)
            .ok_or_else(|| PlaintextError::MissingField(key.to_string()))
    }

    /// Extract a `<digits>u64` amount literal.
    pub fn require_u64(&self, key: &str) -> Result<u64, PlaintextError> {
        let value = self.require(key)?;
        value
            .strip_suffix("u64")
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| PlaintextError::InvalidAmount {
                field: key.to_string(),
                value: value.to_string(),
            })
    }

    /// Extract a boolean literal.
    pub fn require_bool(&self, key: &str) -> Result<bool, PlaintextError> {
        match self.require(key)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(PlaintextError::InvalidBool {
                field: key.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Extract a field-element literal.
    pub fn require_field(&self, key: &str) -> Result<Fr, PlaintextError> {
        Ok(field_from_literal(self.require(key)?)?)
    }
}

// ---------------------------------------------------------------------------
// Typed record data
// ---------------------------------------------------------------------------

/// A decrypted private balance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecordData {
    /// Owning address.
    pub owner: String,
    /// Value in the asset's smallest unit.
    pub amount: u64,
    /// Asset discriminator.
    pub asset: AssetKind,
}

/// A merchant's private copy of a published invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecordData {
    /// Owning (merchant) address.
    pub owner: String,
    /// The invoice salt.
    pub salt: Fr,
    /// The invoice commitment.
    pub commitment: Fr,
    /// Committed amount (zero for donations).
    pub amount: u64,
}

/// One side's receipt record from a settle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptRecordData {
    /// Owning address.
    pub owner: String,
    /// The receipt commitment — identical on both sides of one payment.
    pub commitment: Fr,
    /// Settled amount.
    pub amount: u64,
}

/// Classification of a decrypted record plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// A spendable private balance.
    Balance(BalanceRecordData),
    /// A merchant's invoice record.
    Invoice(InvoiceRecordData),
    /// The payer-side receipt of a settlement.
    PayerReceipt(ReceiptRecordData),
    /// The merchant-side receipt of a settlement.
    MerchantReceipt(ReceiptRecordData),
    /// Tokenized fine, matched no known shape. Keys retained so callers
    /// can log what the wallet actually handed over.
    Unknown {
        /// The keys present in the block.
        keys: Vec<String>,
    },
}

impl RecordData {
    /// Parse and classify a decrypted record plaintext.
    pub fn parse(text: &str) -> Result<Self, PlaintextError> {
        let block = KvBlock::parse(text)?;

        if let Some(role) = block.get("role") {
            let data = ReceiptRecordData {
                owner: block.require("owner")?.to_string(),
                commitment: block.require_field("commitment")?,
                amount: block.require_u64("amount")?,
            };
            return match role {
                "payer" => Ok(Self::PayerReceipt(data)),
                "merchant" => Ok(Self::MerchantReceipt(data)),
                other => Err(PlaintextError::UnknownRole(other.to_string())),
            };
        }

        if block.get("salt").is_some() {
            return Ok(Self::Invoice(InvoiceRecordData {
                owner: block.require("owner")?.to_string(),
                salt: block.require_field("salt")?,
                commitment: block.require_field("commitment")?,
                amount: block.require_u64("amount")?,
            }));
        }

        if block.get("asset").is_some() {
            let token = block.require("asset")?;
            let asset = AssetKind::from_wire_token(token)
                .map_err(|_| PlaintextError::UnknownRecordAsset(token.to_string()))?;
            return Ok(Self::Balance(BalanceRecordData {
                owner: block.require("owner")?.to_string(),
                amount: block.require_u64("amount")?,
                asset,
            }));
        }

        Ok(Self::Unknown { keys: block.keys() })
    }
}

/// Render a balance record to its plaintext form. Inverse of the balance
/// arm of [`RecordData::parse`]; the devnet wallet uses it to mint
/// records that the production parser accepts.
pub fn render_balance_record(owner: &str, amount: u64, asset: AssetKind) -> String {
    format!("{{ owner: {owner}, amount: {amount}u64, asset: {asset} }}")
}

/// Render a receipt record to its plaintext form.
pub fn render_receipt_record(owner: &str, commitment: &Fr, amount: u64, payer_side: bool) -> String {
    let role = if payer_side { "payer" } else { "merchant" };
    format!(
        "{{ owner: {owner}, commitment: {}, amount: {amount}u64, role: {role} }}",
        crate::crypto::hash::field_to_literal(commitment),
    )
}
