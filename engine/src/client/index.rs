//! Off-chain invoice index.
//!
//! A best-effort metadata cache keyed by invoice commitment: encrypted
//! merchant address, display metadata, and settlement bookkeeping. The
//! chain is the sole authority on settlement — index writes that fail are
//! logged and forgotten, never rolled back and never retried in-line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the index API.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The request could not be completed.
    #[error("invoice index request failed: {0}")]
    Request(String),
}

/// Cached invoice metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    /// Invoice commitment, as a wire literal. Primary key.
    pub commitment: String,
    /// Merchant address encrypted to the merchant's view key. The index
    /// never stores the address in the clear.
    pub merchant_cipher: Option<String>,
    /// Requested amount in smallest units (zero for open donations).
    pub amount: u64,
    /// Asset wire token.
    pub asset: String,
    /// Invoice-kind wire token.
    pub kind: String,
    /// Cached settlement status. Advisory only.
    pub settled: bool,
    /// Confirmed transaction ids of payments seen so far.
    pub payment_transactions: Vec<String>,
    /// Payer address of the settling payment, when disclosed.
    pub payer: Option<String>,
    /// Free-text memo.
    pub memo: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Post-settlement bookkeeping payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementUpdate {
    /// Whether the invoice should now be cached as settled. False for
    /// repeat-payable kinds, which stay open.
    pub settled: bool,
    /// Confirmed transaction id of the payment.
    pub payment_transaction: String,
    /// Payer address, when the payer chose to disclose it.
    pub payer: Option<String>,
}

/// The index collaborator. Fetches and updates are both best-effort.
#[async_trait]
pub trait InvoiceIndex: Send + Sync {
    /// Fetch cached metadata by commitment literal.
    async fn fetch(&self, commitment: &str) -> Result<Option<InvoiceMetadata>, IndexError>;

    /// Register a freshly published invoice.
    async fn register(&self, metadata: InvoiceMetadata) -> Result<(), IndexError>;

    /// Record a settlement against an invoice.
    async fn record_settlement(
        &self,
        commitment: &str,
        update: SettlementUpdate,
    ) -> Result<(), IndexError>;
}
