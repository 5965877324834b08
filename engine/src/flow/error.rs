//! Payment-flow error taxonomy.
//!
//! Lower layers fail loudly in their own vocabularies; this enum is where
//! those failures are classified for routing. The lifecycle controller is
//! the only place that decides retry vs. abort vs. fallback:
//!
//! - invalid invoice → fatal, never retried;
//! - insufficiency / fragmentation → routed to conversion when the asset
//!   supports it, otherwise surfaced;
//! - wallet interaction failures → surfaced verbatim, never auto-retried;
//! - transient transport errors → swallowed inside the bounded poll loop
//!   and never escape as this type;
//! - timeout → distinct from rejection, retryable by the user;
//! - hash-unrecoverable → the transition may well have succeeded
//!   on-chain; a warning-grade outcome, distinct from failure;
//! - off-chain bookkeeping failures → logged at the call site, never an
//!   error at all.

use thiserror::Error;

use crate::client::ledger::LedgerError;
use crate::client::wallet::WalletError;
use crate::compliance::ComplianceError;
use crate::record::selector::SelectionError;

/// Everything the payment lifecycle can fail with.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Commitment mismatch, missing mapping, or unusable link parameters.
    /// The invoice is treated as forged or corrupted. Fatal.
    #[error("invalid invoice: {reason}")]
    InvalidInvoice {
        /// What exactly failed to check out.
        reason: String,
    },

    /// No spendable record, after conversion was either exhausted or
    /// unavailable for the asset.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The wallet connector refused or failed an interaction. Surfaced
    /// verbatim; the user decides what to do next.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// A ledger query failed outside the polling window.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The freeze-registry proof could not be built soundly.
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    /// The network definitively rejected the transition.
    #[error("transition rejected: {reason}")]
    Rejected {
        /// Reason reported by the wallet or network.
        reason: String,
    },

    /// The confirmation poll bound was exhausted without a terminal
    /// status. Not a rejection — the user may simply retry.
    #[error("confirmation timed out after {attempts} polls")]
    Timeout {
        /// How many polls were made before giving up.
        attempts: u32,
    },

    /// The transition was accepted but its commitment output could not
    /// be recovered through any resolution strategy. The on-chain state
    /// may still be correct; this is an observability gap.
    #[error(
        "transition {transient_id} was accepted but its output hash could not be recovered \
         through any channel"
    )]
    HashUnrecoverable {
        /// The transient id of the accepted submission.
        transient_id: String,
    },

    /// The hosting surface cancelled the flow; the engine stopped before
    /// the next network call and mutated nothing afterwards.
    #[error("payment flow cancelled")]
    Cancelled,
}

impl PaymentError {
    /// Whether the user can sensibly retry the same attempt unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// Note the deliberate absence of `From<IndexError>`: the index is
// best-effort by contract, so bookkeeping failures are logged at the call
// site and can never abort a payment via `?`.
