//! # The Payment Flow
//!
//! Everything between "user opened an invoice link" and "the chain says
//! it settled":
//!
//! ```text
//!   ┌────────┐    ┌────────┐    ┌─────────┐    ┌─────┐    ┌─────────┐
//!   │Connect │───►│ Verify │───►│(Convert)│───►│ Pay │───►│ Success │
//!   └────────┘    └───┬────┘    └─────────┘    └─────┘    └─────────┘
//!                     │
//!                     └──────────► AlreadyPaid
//! ```
//!
//! ### Module map
//!
//! - `lifecycle` — the [`PaymentFlow`] state machine and the merchant's
//!   [`InvoicePublisher`].
//! - `polling` — the explicit [`RetryPolicy`] and the cancellable
//!   confirmation loop both flows share.
//! - `resolve` — the ordered resolver chain that recovers a transition's
//!   commitment output when it is not returned synchronously.
//! - `error` — the [`PaymentError`] taxonomy; the lifecycle controller
//!   is the only component that classifies and routes failures.

pub mod error;
pub mod lifecycle;
pub mod polling;
pub mod resolve;

pub use error::PaymentError;
pub use lifecycle::{
    InvoicePublisher, NewInvoice, PaymentAttempt, PaymentFlow, PaymentOutcome, PaymentStep,
    PublishedInvoice, VerifiedInvoice,
};
pub use polling::{poll_until_final, PollOutcome, RetryPolicy};
pub use resolve::{
    default_resolver_chain, resolve_commitment, CommitmentResolver, ExplorerTraceResolver,
    ResolutionContext, StatusOutputResolver, WalletHistoryResolver,
};
