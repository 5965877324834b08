//! # Protocol Configuration & Constants
//!
//! Every protocol identifier the engine talks to the chain with lives here,
//! exactly once. Earlier revisions of the client scattered program and
//! mapping names across call sites and drifted between versions; the rule
//! now is that components never read ambient globals — they receive an
//! immutable [`ProtocolConfig`] at construction and use nothing else.
//!
//! The module-level constants are the defaults. Tests and devnet tooling
//! build a `ProtocolConfig` with overrides; production uses `default()`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// On-chain identifiers
// ---------------------------------------------------------------------------

/// The invoice program deployed on the record ledger. Owns the salt →
/// commitment mapping, the invoice state mapping, and the settle/publish
/// transitions.
pub const INVOICE_PROGRAM: &str = "veil_invoices_v2";

/// The wrapped-stable token program. Owns the shielded wUSD records and
/// the compliance freeze registry that stable transfers must prove against.
pub const STABLE_PROGRAM: &str = "veil_wusd_v1";

/// Mapping: invoice salt (field) → invoice commitment (field).
pub const COMMITMENT_MAPPING: &str = "commitments";

/// Mapping: invoice commitment (field) → on-chain invoice state block.
pub const INVOICE_STATE_MAPPING: &str = "invoices";

/// Mapping: constant key `0u8` → current freeze-registry Merkle root.
pub const FREEZE_ROOT_MAPPING: &str = "freeze_root";

/// Mapping: leaf index (u32) → occupied freeze-registry leaf value.
/// Absent keys are empty leaves; that absence is a normal outcome.
pub const FREEZE_LEAF_MAPPING: &str = "freeze_leaves";

/// Human-readable prefix of ledger addresses (`veil1…`, Bech32).
pub const ADDRESS_HRP: &str = "veil";

// ---------------------------------------------------------------------------
// Transition function names
// ---------------------------------------------------------------------------

/// Publish a new invoice commitment under a fresh salt.
pub const PUBLISH_FUNCTION: &str = "publish_invoice";

/// Settle an invoice by consuming a private native-credit record.
pub const SETTLE_FUNCTION: &str = "settle_invoice";

/// Settle an invoice by consuming a private wUSD record. Takes the
/// freeze-proof pair in addition to the settle inputs.
pub const SETTLE_STABLE_FUNCTION: &str = "settle_stable_invoice";

/// Convert public native balance into a fresh private record. Only the
/// primary asset has a public pool to shield from; wUSD exists purely as
/// private records once bridged in.
pub const SHIELD_FUNCTION: &str = "shield";

// ---------------------------------------------------------------------------
// Compliance registry geometry
// ---------------------------------------------------------------------------

/// Depth of the freeze-registry sparse Merkle tree. Fixed by the deployed
/// token program; the proof carries exactly this many siblings.
pub const FREEZE_TREE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Timing & retry parameters
// ---------------------------------------------------------------------------

/// Interval between confirmation polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum confirmation polls before the attempt times out. 120 polls at
/// one-second cadence gives the network about two minutes to finalize,
/// which covers every healthy propagation path we have measured.
pub const POLL_MAX_ATTEMPTS: u32 = 120;

/// How long to wait before querying a public explorer for a transaction
/// trace. Explorers index a beat behind the validators; asking too early
/// just burns a round trip on a guaranteed miss.
pub const EXPLORER_PROPAGATION_DELAY: Duration = Duration::from_secs(3);

/// Delay before the record selector retries against a refreshed record
/// set. One bounded retry only — the wallet's sync loop owns anything
/// longer than this.
pub const RECORD_RESYNC_DELAY: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Flat fee attached to every transition submission, in grains
/// (the smallest native unit, 10^-6 of a credit).
pub const DEFAULT_FEE_GRAINS: u64 = 35_000;

/// Safety margin added on top of the required amount when converting
/// public balance into a private record. Absorbs fee rounding so the
/// freshly shielded record strictly exceeds the invoice amount.
pub const CONVERSION_BUFFER_GRAINS: u64 = 25_000;

// ---------------------------------------------------------------------------
// ProtocolConfig
// ---------------------------------------------------------------------------

/// Immutable protocol wiring handed to every engine component.
///
/// Construct once (usually via `Default`) and share by reference or clone.
/// There is deliberately no setter API and no global instance — a component
/// that needs a different program id gets a different config, explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Invoice program id.
    pub invoice_program: String,
    /// Wrapped-stable token program id.
    pub stable_program: String,
    /// Salt → commitment mapping name.
    pub commitment_mapping: String,
    /// Commitment → invoice state mapping name.
    pub invoice_state_mapping: String,
    /// Freeze-registry root mapping name.
    pub freeze_root_mapping: String,
    /// Freeze-registry occupied-leaf mapping name.
    pub freeze_leaf_mapping: String,

    /// Invoice publication function.
    pub publish_function: String,
    /// Native settle function.
    pub settle_function: String,
    /// Wrapped-stable settle function (freeze proof required).
    pub settle_stable_function: String,
    /// Public→private conversion function (primary asset only).
    pub shield_function: String,

    /// Flat submission fee in grains.
    pub fee_grains: u64,
    /// Conversion safety buffer in grains.
    pub conversion_buffer_grains: u64,

    /// Confirmation poll cadence.
    pub poll_interval: Duration,
    /// Confirmation poll bound.
    pub poll_max_attempts: u32,
    /// Wait before the explorer fallback query.
    pub explorer_propagation_delay: Duration,
    /// Wait before the selector's single record re-sync retry.
    pub record_resync_delay: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            invoice_program: INVOICE_PROGRAM.to_string(),
            stable_program: STABLE_PROGRAM.to_string(),
            commitment_mapping: COMMITMENT_MAPPING.to_string(),
            invoice_state_mapping: INVOICE_STATE_MAPPING.to_string(),
            freeze_root_mapping: FREEZE_ROOT_MAPPING.to_string(),
            freeze_leaf_mapping: FREEZE_LEAF_MAPPING.to_string(),
            publish_function: PUBLISH_FUNCTION.to_string(),
            settle_function: SETTLE_FUNCTION.to_string(),
            settle_stable_function: SETTLE_STABLE_FUNCTION.to_string(),
            shield_function: SHIELD_FUNCTION.to_string(),
            fee_grains: DEFAULT_FEE_GRAINS,
            conversion_buffer_grains: CONVERSION_BUFFER_GRAINS,
            poll_interval: POLL_INTERVAL,
            poll_max_attempts: POLL_MAX_ATTEMPTS,
            explorer_propagation_delay: EXPLORER_PROPAGATION_DELAY,
            record_resync_delay: RECORD_RESYNC_DELAY,
        }
    }
}

impl ProtocolConfig {
    /// Returns the settle function for the given asset's payment path.
    /// The wrapped-stable path is the one that carries the freeze proof.
    pub fn settle_function_for(&self, stable: bool) -> &str {
        if stable {
            &self.settle_stable_function
        } else {
            &self.settle_function
        }
    }

    /// Returns the program whose records carry private balances of the
    /// given asset. Native records live under the invoice program; wUSD
    /// records under the token program.
    pub fn record_program_for(&self, stable: bool) -> &str {
        if stable {
            &self.stable_program
        } else {
            &self.invoice_program
        }
    }

    /// A fast-polling configuration for tests and local devnets. Keeps the
    /// 120-attempt bound, which timeout behavior depends on, but shrinks
    /// every wall-clock delay to near zero.
    pub fn devnet() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            explorer_propagation_delay: Duration::from_millis(1),
            record_resync_delay: Duration::from_millis(1),
            ..Self::default()
        }
    }
}
