//! Wallet connector capability.
//!
//! The wallet holds the user's keys. It decrypts records, signs and
//! submits transitions, and reports their status. The engine never sees
//! key material — it hands the wallet a fully ordered input list and gets
//! back a transient transaction id to poll.
//!
//! Every operation can reject with a connector error. The lifecycle
//! controller classifies those: user rejection and permission denial
//! surface verbatim and are never retried; transport hiccups are
//! swallowed inside the bounded polling window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ledger::ExecutionTrace;

/// Errors raised by the wallet connector.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The user dismissed the wallet prompt.
    #[error("user rejected the wallet request")]
    UserRejected,

    /// The wallet refused the operation on permission grounds.
    #[error("wallet permission denied: {0}")]
    PermissionDenied(String),

    /// The wallet session is gone.
    #[error("wallet disconnected")]
    Disconnected,

    /// The connector does not implement the requested capability
    /// (e.g. transaction history on minimal wallets).
    #[error("wallet capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Transient transport failure between client and wallet.
    #[error("wallet transport error: {0}")]
    Transport(String),
}

impl WalletError {
    /// Transient errors may be retried inside a bounded polling loop;
    /// everything else reflects a user or capability decision and is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A fully specified transition submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Target program id.
    pub program: String,
    /// Transition function name.
    pub function: String,
    /// Ordered input literals, exactly as the function signature expects.
    pub inputs: Vec<String>,
    /// Fee in grains.
    pub fee_grains: u64,
}

/// Transition status as the wallet reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionStatus {
    /// Submitted, not yet finalized.
    Pending,
    /// Finalized on-chain.
    Confirmed,
    /// Definitively rejected — fatal, distinct from a timeout.
    Rejected {
        /// Human-readable rejection reason from the wallet or network.
        reason: String,
    },
}

/// One status-poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Current status.
    pub status: TransitionStatus,
    /// Confirmed (on-chain) transaction id, once known. May differ from
    /// the transient id the wallet returned at submission.
    pub confirmed_id: Option<String>,
    /// Execution outputs, when the wallet surfaces them inline. Often
    /// empty — that is what the resolver fallback chain is for.
    pub outputs: Vec<String>,
}

/// A record as listed by the wallet, possibly still encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Record ciphertext, always present.
    pub ciphertext: String,
    /// Decrypted plaintext, present when the wallet has view access and
    /// chose to decrypt eagerly.
    pub plaintext: Option<String>,
    /// Spent flag maintained by the wallet's sync engine.
    pub spent: bool,
}

/// The wallet connector capability surface.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// The connected identity's address, or `None` while the user has
    /// not approved a connection yet.
    async fn identity(&self) -> Result<Option<String>, WalletError>;

    /// Submit a transition. Returns a transient transaction id suitable
    /// for status polling; the confirmed id arrives via status reports.
    async fn submit_transition(&self, request: TransitionRequest) -> Result<String, WalletError>;

    /// Poll the status of a previously submitted transition.
    async fn transaction_status(&self, transient_id: &str) -> Result<StatusReport, WalletError>;

    /// List records owned by the connected identity under a program.
    async fn records(&self, program: &str) -> Result<Vec<WalletRecord>, WalletError>;

    /// Decrypt a record ciphertext. Bounded by wallet policy — may be
    /// denied per record.
    async fn decrypt_record(&self, ciphertext: &str) -> Result<String, WalletError>;

    /// Optional capability: the wallet's own stored execution trace for
    /// a transaction. Wallets without history support return
    /// [`WalletError::CapabilityUnavailable`].
    async fn transaction_history(
        &self,
        transient_id: &str,
    ) -> Result<Option<ExecutionTrace>, WalletError>;
}
