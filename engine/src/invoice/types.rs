//! Core invoice vocabulary: asset kinds, invoice kinds, status, and the
//! parsed on-chain invoice state block.
//!
//! These types are deliberately small and `Copy`-friendly where possible.
//! The commitment math lives in [`crate::crypto::commitment`]; this module
//! owns the kind-specific rules layered on top of it — most importantly
//! the donation zero-amount convention.

use std::fmt;

use ark_bn254::Fr;
use bech32::Hrp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ADDRESS_HRP;
use crate::crypto::derive_invoice_commitment;
use crate::record::plaintext::{KvBlock, PlaintextError};

// ---------------------------------------------------------------------------
// AssetKind
// ---------------------------------------------------------------------------

/// The two assets an invoice can denominate.
///
/// The kind determines the settle transition used, whether a freeze-list
/// proof is required, and whether a shortfall can be covered by shielding
/// public balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Native credits. No compliance registry; public balance can be
    /// shielded into a private record on demand.
    Primary,
    /// Wrapped stablecoin (wUSD). Settlement must carry a freeze-registry
    /// proof, and there is no public pool to shield from — wUSD exists
    /// only as private records once bridged in.
    WrappedStable,
}

impl AssetKind {
    /// Token string used in links, plaintexts, and mapping values.
    pub fn wire_token(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::WrappedStable => "wusd",
        }
    }

    /// Parse the wire token. Unknown tokens are an error, not a default.
    pub fn from_wire_token(token: &str) -> Result<Self, InvoiceStateError> {
        match token {
            "primary" => Ok(Self::Primary),
            "wusd" => Ok(Self::WrappedStable),
            other => Err(InvoiceStateError::UnknownAsset(other.to_string())),
        }
    }

    /// Whether settlement in this asset must prove against the freeze
    /// registry.
    pub fn requires_freeze_proof(&self) -> bool {
        matches!(self, Self::WrappedStable)
    }

    /// Whether a balance shortfall can be covered by converting public
    /// balance into a fresh private record.
    pub fn supports_public_conversion(&self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_token())
    }
}

// ---------------------------------------------------------------------------
// InvoiceKind
// ---------------------------------------------------------------------------

/// What kind of payment relationship the invoice encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceKind {
    /// One payer, one settlement. Status flips Open → Settled exactly once.
    Standard,
    /// Many payers against one link; stays Open indefinitely.
    MultiPay,
    /// Open-amount contribution; the merchant closes it when they choose.
    Donation,
}

impl InvoiceKind {
    /// Token string used in links and mapping values.
    pub fn wire_token(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::MultiPay => "multi",
            Self::Donation => "donation",
        }
    }

    /// Parse the wire token.
    pub fn from_wire_token(token: &str) -> Result<Self, InvoiceStateError> {
        match token {
            "standard" => Ok(Self::Standard),
            "multi" => Ok(Self::MultiPay),
            "donation" => Ok(Self::Donation),
            other => Err(InvoiceStateError::UnknownKind(other.to_string())),
        }
    }

    /// The amount that enters the invoice commitment formula.
    ///
    /// Donations always commit to zero — the commitment binds the invoice
    /// identity, and the donated amount is chosen at payment time. This
    /// asymmetry (commit to zero, settle the real amount) is intentional
    /// protocol design; do not "fix" it when adding kinds.
    pub fn commitment_amount(&self, amount: u64) -> u64 {
        match self {
            Self::Donation => 0,
            _ => amount,
        }
    }

    /// Whether the invoice may be paid more than once. Repeat-payable
    /// invoices are never marked settled by the payer's bookkeeping.
    pub fn allows_repeat_payment(&self) -> bool {
        matches!(self, Self::MultiPay | Self::Donation)
    }
}

impl fmt::Display for InvoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_token())
    }
}

// ---------------------------------------------------------------------------
// InvoiceStatus
// ---------------------------------------------------------------------------

/// On-chain settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Payable.
    Open,
    /// Already paid; any further payment attempt short-circuits.
    Settled,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Settled => f.write_str("settled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing an on-chain invoice state block or validating an
/// address.
#[derive(Debug, Error)]
pub enum InvoiceStateError {
    /// The state block text could not be tokenized.
    #[error("malformed invoice state block: {0}")]
    Malformed(#[from] PlaintextError),

    /// Unknown asset token in the state block.
    #[error("unknown asset token {0:?}")]
    UnknownAsset(String),

    /// Unknown invoice-kind token in the state block.
    #[error("unknown invoice kind token {0:?}")]
    UnknownKind(String),

    /// The merchant address failed Bech32 validation.
    #[error("invalid merchant address: {0}")]
    InvalidAddress(String),

    /// The merchant address carries the wrong human-readable prefix.
    #[error("wrong address prefix: expected {expected:?}, got {got:?}")]
    WrongAddressPrefix {
        /// The prefix every ledger address carries.
        expected: String,
        /// The prefix that was found.
        got: String,
    },
}

/// Validate a `veil1…` ledger address: Bech32 checksum, HRP, and 32-byte
/// payload. Returns the address untouched so call sites can chain.
pub fn validate_address(address: &str) -> Result<&str, InvoiceStateError> {
    let (hrp, data) =
        bech32::decode(address).map_err(|e| InvoiceStateError::InvalidAddress(e.to_string()))?;

    let expected = Hrp::parse(ADDRESS_HRP).expect("static HRP is valid");
    if hrp != expected {
        return Err(InvoiceStateError::WrongAddressPrefix {
            expected: ADDRESS_HRP.to_string(),
            got: hrp.to_string(),
        });
    }

    if data.len() != 32 {
        return Err(InvoiceStateError::InvalidAddress(format!(
            "address payload must be 32 bytes, got {}",
            data.len()
        )));
    }

    Ok(address)
}

// ---------------------------------------------------------------------------
// OnChainInvoiceState
// ---------------------------------------------------------------------------

/// The invoice state block stored in the `invoices` mapping, keyed by
/// commitment. The chain is authoritative for this; the off-chain index
/// only caches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainInvoiceState {
    /// Settlement status.
    pub status: InvoiceStatus,
    /// Asset the invoice denominates.
    pub asset: AssetKind,
    /// Invoice kind.
    pub kind: InvoiceKind,
}

impl OnChainInvoiceState {
    /// Parse a mapping value of the form
    /// `{ settled: false, asset: primary, kind: standard }`.
    pub fn parse(text: &str) -> Result<Self, InvoiceStateError> {
        let block = KvBlock::parse(text)?;
        let settled = block.require_bool("settled")?;
        let asset = AssetKind::from_wire_token(block.require("asset")?)?;
        let kind = InvoiceKind::from_wire_token(block.require("kind")?)?;
        Ok(Self {
            status: if settled {
                InvoiceStatus::Settled
            } else {
                InvoiceStatus::Open
            },
            asset,
            kind,
        })
    }

    /// Render back to the mapping-value text form.
    pub fn render(&self) -> String {
        format!(
            "{{ settled: {}, asset: {}, kind: {} }}",
            matches!(self.status, InvoiceStatus::Settled),
            self.asset,
            self.kind
        )
    }
}

// ---------------------------------------------------------------------------
// Invoice
// ---------------------------------------------------------------------------

/// A fully resolved, verifiable invoice as the payer sees it.
///
/// Immutable once constructed. `amount` is zero for open-ended donation
/// links; the actual contribution is chosen at payment time.
#[derive(Debug, Clone)]
pub struct Invoice {
    /// Merchant's ledger address (`veil1…`).
    pub merchant: String,
    /// Requested amount in the asset's smallest unit. Zero for
    /// open-ended donations.
    pub amount: u64,
    /// The invoice salt from the link.
    pub salt: Fr,
    /// The public commitment this invoice is bound to.
    pub commitment: Fr,
    /// Asset the invoice denominates.
    pub asset: AssetKind,
    /// Invoice kind.
    pub kind: InvoiceKind,
    /// Free-text memo from the link, if any. Display only — never part
    /// of the commitment.
    pub memo: Option<String>,
}

impl Invoice {
    /// Recompute the commitment this invoice should be bound to on-chain,
    /// honoring the donation zero-amount convention.
    pub fn expected_commitment(&self) -> Fr {
        derive_invoice_commitment(
            &self.merchant,
            self.kind.commitment_amount(self.amount),
            &self.salt,
        )
    }
}
