//! # Freeze-Registry Proofs
//!
//! Wrapped-stable settlements must prove the transfer's position against
//! a compliance registry: a sparse Merkle tree of fixed depth 16 whose
//! leaves are almost all empty. The proof is the ordered list of sixteen
//! sibling hashes from the target leaf up to the root, plus the leaf
//! index; the on-chain verifier folds them and compares against the
//! registry root.
//!
//! ## Construction
//!
//! Per-level empty-subtree hashes are precomputed bottom-up from the
//! canonical zero leaf: `empty[k+1] = H(empty[k], empty[k])`. In the
//! registry's current state at most leaf 0 is populated, so every sibling
//! on the path is an empty-level hash — except the level-0 sibling when
//! the target is leaf 1 and leaf 0 holds a real value, in which case that
//! value is substituted.
//!
//! ## Fail closed
//!
//! Before a proof leaves this module it is folded locally and checked
//! against the on-chain root. A mismatch means our picture of the
//! registry is stale or wrong, and the payment aborts with
//! [`ComplianceError::RootMismatch`]. The engine never falls back to an
//! all-empty proof it cannot verify — an unsound proof that happens to be
//! accepted is strictly worse than a failed payment.

use ark_bn254::Fr;
use ark_ff::Zero;
use thiserror::Error;

use crate::client::ledger::{LedgerError, LedgerQuery};
use crate::config::{ProtocolConfig, FREEZE_TREE_DEPTH};
use crate::crypto::hash::{
    domain_hash, field_from_literal, field_to_bytes, field_to_literal, hash_to_field,
    FieldCodecError,
};

const DOMAIN_FREEZE_NODE: &str = "veil/freeze/node";
const DOMAIN_FREEZE_INDEX: &str = "veil/freeze/index";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from building or verifying a freeze-registry proof.
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// The target index does not fit a depth-16 tree.
    #[error("leaf index {index} exceeds registry capacity {capacity}")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of leaves in the tree.
        capacity: u64,
    },

    /// The locally folded root does not match the on-chain root. The
    /// payment must not proceed with this proof.
    #[error("freeze registry root mismatch: on-chain {onchain}, locally folded {computed}")]
    RootMismatch {
        /// Root fetched from the ledger.
        onchain: String,
        /// Root recomputed from the proof.
        computed: String,
    },

    /// Fetching registry state failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// An on-chain registry value failed to decode.
    #[error("registry value decode failed: {0}")]
    Codec(#[from] FieldCodecError),
}

// ---------------------------------------------------------------------------
// Tree arithmetic
// ---------------------------------------------------------------------------

/// Hash one interior node from its children.
fn node_hash(left: &Fr, right: &Fr) -> Fr {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&field_to_bytes(left));
    preimage[32..].copy_from_slice(&field_to_bytes(right));
    hash_to_field(DOMAIN_FREEZE_NODE, &preimage)
}

/// Empty-subtree hashes for levels `0..=DEPTH`. Index 0 is the canonical
/// zero leaf; index `DEPTH` is the root of a fully empty registry.
fn empty_levels() -> [Fr; FREEZE_TREE_DEPTH + 1] {
    let mut levels = [Fr::zero(); FREEZE_TREE_DEPTH + 1];
    for k in 0..FREEZE_TREE_DEPTH {
        levels[k + 1] = node_hash(&levels[k], &levels[k]);
    }
    levels
}

/// The root of a fully empty registry.
pub fn empty_registry_root() -> Fr {
    empty_levels()[FREEZE_TREE_DEPTH]
}

/// The registry leaf index assigned to an address: sixteen bits of a
/// domain-separated hash, matching the tree depth. This is the position
/// a payer proves empty about themselves.
pub fn leaf_index_for(address: &str) -> u32 {
    let digest = domain_hash(DOMAIN_FREEZE_INDEX, address.as_bytes());
    u32::from(digest[0]) | (u32::from(digest[1]) << 8)
}

// ---------------------------------------------------------------------------
// RegistryView
// ---------------------------------------------------------------------------

/// The on-chain registry state a proof is built against. Fetched fresh
/// per payment attempt; never cached across attempts.
#[derive(Debug, Clone)]
pub struct RegistryView {
    /// Current registry root. Defaults to the empty root when the
    /// mapping is unpopulated.
    pub root: Fr,
    /// The registry's first (and currently only possible) occupied
    /// leaf, when present.
    pub occupied_leaf_zero: Option<Fr>,
}

impl RegistryView {
    /// Fetch the registry root and leaf 0 from the ledger. Both keys may
    /// legitimately be absent — an unpopulated registry is the normal
    /// state, not an error.
    pub async fn fetch<L: LedgerQuery + ?Sized>(
        ledger: &L,
        config: &ProtocolConfig,
    ) -> Result<Self, ComplianceError> {
        let root = match ledger
            .mapping_value(&config.stable_program, &config.freeze_root_mapping, "0u8")
            .await?
        {
            Some(literal) => field_from_literal(&literal)?,
            None => empty_registry_root(),
        };

        let occupied_leaf_zero = match ledger
            .mapping_value(&config.stable_program, &config.freeze_leaf_mapping, "0u32")
            .await?
        {
            Some(literal) => Some(field_from_literal(&literal)?),
            None => None,
        };

        Ok(Self {
            root,
            occupied_leaf_zero,
        })
    }
}

// ---------------------------------------------------------------------------
// FreezeProof
// ---------------------------------------------------------------------------

/// A sibling path through the freeze registry: sixteen hashes in
/// bottom-to-top order plus the target leaf index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeProof {
    /// Sibling hash per level, level 0 first.
    pub siblings: [Fr; FREEZE_TREE_DEPTH],
    /// The target leaf index.
    pub leaf_index: u32,
}

impl FreezeProof {
    /// Fold the path upward from `leaf`, reproducing the root this proof
    /// commits to. Pair order at each level follows the index parity:
    /// even index means the current node is the left child.
    pub fn fold_root(&self, leaf: &Fr) -> Fr {
        let mut current = *leaf;
        let mut index = self.leaf_index as u64;
        for sibling in &self.siblings {
            current = if index % 2 == 0 {
                node_hash(&current, sibling)
            } else {
                node_hash(sibling, &current)
            };
            index /= 2;
        }
        current
    }

    /// Render the proof as a transition input literal.
    pub fn to_wire(&self) -> String {
        let siblings = self
            .siblings
            .iter()
            .map(field_to_literal)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{ index: {}u32, siblings: [{}] }}", self.leaf_index, siblings)
    }
}

// ---------------------------------------------------------------------------
// FreezeProofBuilder
// ---------------------------------------------------------------------------

/// Builds non-membership proofs against the current registry state.
pub struct FreezeProofBuilder;

impl FreezeProofBuilder {
    /// Build a proof that `leaf_index` is empty in the registry described
    /// by `registry`, verified locally against the on-chain root before
    /// being returned.
    pub fn build(
        registry: &RegistryView,
        leaf_index: u32,
    ) -> Result<FreezeProof, ComplianceError> {
        let capacity = 1u64 << FREEZE_TREE_DEPTH;
        if u64::from(leaf_index) >= capacity {
            return Err(ComplianceError::IndexOutOfRange {
                index: leaf_index,
                capacity,
            });
        }

        let empties = empty_levels();
        let mut siblings = [Fr::zero(); FREEZE_TREE_DEPTH];
        let mut index = u64::from(leaf_index);

        for (level, slot) in siblings.iter_mut().enumerate() {
            let sibling_index = index ^ 1;
            *slot = if level == 0 && sibling_index == 0 {
                // The registry's one possibly-populated position.
                registry.occupied_leaf_zero.unwrap_or(empties[0])
            } else {
                empties[level]
            };
            index /= 2;
        }

        let proof = FreezeProof {
            siblings,
            leaf_index,
        };

        // Fail closed: the target leaf is claimed empty, so folding from
        // the zero leaf must land exactly on the on-chain root.
        let computed = proof.fold_root(&empties[0]);
        if computed != registry.root {
            return Err(ComplianceError::RootMismatch {
                onchain: field_to_literal(&registry.root),
                computed: field_to_literal(&computed),
            });
        }

        Ok(proof)
    }
}
