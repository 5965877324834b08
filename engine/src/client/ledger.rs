//! Read-only ledger query interface.
//!
//! Two capabilities: resolving a named mapping's value by key, and
//! fetching a transaction's execution trace from a public explorer. Both
//! treat "not found" as a normal `Ok(None)` outcome — an unpopulated
//! mapping key is protocol state, not a failure.

use ark_bn254::Fr;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::field_from_literal;

/// Errors from the ledger query endpoint. All variants are transport
/// grade; "key absent" is expressed as `Ok(None)`, never as an error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The query could not be completed (network, endpoint, decoding).
    #[error("ledger query failed: {0}")]
    Query(String),
}

/// One transition's slice of an execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionTrace {
    /// The transition function that produced these outputs.
    pub function: String,
    /// Output values in declaration order, as wire literals.
    pub outputs: Vec<String>,
}

/// A transaction's execution trace as returned by the explorer or the
/// wallet's history capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Confirmed transaction identifier, when the source knows it.
    pub confirmed_id: Option<String>,
    /// Per-transition outputs.
    pub transitions: Vec<TransitionTrace>,
}

impl ExecutionTrace {
    /// Find the first output of the named function that decodes as a
    /// field element. This is how commitment outputs are recovered from
    /// traces; non-field outputs (records, integers) are skipped.
    pub fn first_field_output(&self, function: &str) -> Option<Fr> {
        self.transitions
            .iter()
            .filter(|t| t.function == function)
            .flat_map(|t| t.outputs.iter())
            .find_map(|output| field_from_literal(output).ok())
    }
}

/// Read-only view of the ledger's public state.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Resolve `program/mapping[key]`. `Ok(None)` means the key is not
    /// populated — callers decide whether that is fatal.
    async fn mapping_value(
        &self,
        program: &str,
        mapping: &str,
        key: &str,
    ) -> Result<Option<String>, LedgerError>;

    /// Fetch the execution trace of a transaction from the public
    /// explorer. `Ok(None)` when the explorer has not indexed it yet.
    async fn transaction_trace(&self, tx_id: &str) -> Result<Option<ExecutionTrace>, LedgerError>;
}
