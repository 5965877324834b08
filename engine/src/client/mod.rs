//! External collaborator interfaces.
//!
//! The engine never talks to the network directly — it drives three
//! capabilities held by the host application:
//!
//! - [`LedgerQuery`] — read-only mapping resolution and explorer traces;
//! - [`WalletConnector`] — keys, record decryption, transition
//!   submission, and status polling;
//! - [`InvoiceIndex`] — the best-effort off-chain metadata cache.
//!
//! [`memory`] provides in-process implementations of all three, wired to
//! a shared mapping store: the devnet backend for `veil demo` and the
//! test double for the flow suites.

pub mod index;
pub mod ledger;
pub mod memory;
pub mod wallet;

pub use index::{IndexError, InvoiceIndex, InvoiceMetadata, SettlementUpdate};
pub use ledger::{ExecutionTrace, LedgerError, LedgerQuery, TransitionTrace};
pub use wallet::{
    StatusReport, TransitionRequest, TransitionStatus, WalletConnector, WalletError, WalletRecord,
};
