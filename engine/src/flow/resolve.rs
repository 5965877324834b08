//! # Commitment-Output Resolution
//!
//! A settle or publish transition outputs the invoice commitment, but the
//! value is not always returned synchronously: some wallets surface
//! execution outputs in their status reports, some only in their history
//! store, and sometimes the only source is a public explorer that indexes
//! a few seconds behind the validators.
//!
//! Resolution is an ordered chain of independent strategies, each
//! returning an optional result; the runner short-circuits on the first
//! success. A strategy failing is expected and logged at debug — only the
//! whole chain coming up empty is surfaced, as
//! [`PaymentError::HashUnrecoverable`], which the caller treats as an
//! observability gap rather than a failed transition.
//!
//! [`PaymentError::HashUnrecoverable`]: crate::flow::error::PaymentError::HashUnrecoverable

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::ledger::LedgerQuery;
use crate::client::wallet::{StatusReport, WalletConnector, WalletError};
use crate::crypto::hash::field_from_literal;

/// Everything a strategy may consult.
pub struct ResolutionContext<'a> {
    /// Transient id returned at submission.
    pub transient_id: &'a str,
    /// Confirmed id, once the status poll reported one.
    pub confirmed_id: Option<&'a str>,
    /// The transition function whose output is wanted.
    pub function: &'a str,
    /// The final status report from the confirmation poll, if available.
    pub final_report: Option<&'a StatusReport>,
}

impl ResolutionContext<'_> {
    /// The best transaction id known: confirmed when available,
    /// transient otherwise.
    pub fn best_id(&self) -> &str {
        self.confirmed_id.unwrap_or(self.transient_id)
    }
}

/// One resolution strategy. Implementations must be independent: no
/// strategy may rely on another having run.
#[async_trait]
pub trait CommitmentResolver: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Attempt resolution. `None` means "not available through this
    /// channel" — never an abort of the overall chain.
    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Option<Fr>;
}

// ---------------------------------------------------------------------------
// Strategy 1 — inline status outputs
// ---------------------------------------------------------------------------

/// Reads execution outputs straight out of the final status report, for
/// wallets that surface them inline.
pub struct StatusOutputResolver;

#[async_trait]
impl CommitmentResolver for StatusOutputResolver {
    fn name(&self) -> &'static str {
        "status-outputs"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Option<Fr> {
        ctx.final_report?
            .outputs
            .iter()
            .find_map(|output| field_from_literal(output).ok())
    }
}

// ---------------------------------------------------------------------------
// Strategy 2 — wallet history
// ---------------------------------------------------------------------------

/// Queries the wallet's own transaction-history capability.
///
/// Aborted early — within this strategy, without retries — when the
/// wallet denies the history permission or reports disconnection. Those
/// answers will not change on a retry, and hammering the wallet with
/// permission prompts teaches users to click "deny" faster.
pub struct WalletHistoryResolver<W> {
    wallet: Arc<W>,
}

impl<W> WalletHistoryResolver<W> {
    /// Wrap the wallet connector.
    pub fn new(wallet: Arc<W>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl<W: WalletConnector + 'static> CommitmentResolver for WalletHistoryResolver<W> {
    fn name(&self) -> &'static str {
        "wallet-history"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Option<Fr> {
        match self.wallet.transaction_history(ctx.transient_id).await {
            Ok(Some(trace)) => trace.first_field_output(ctx.function),
            Ok(None) => None,
            Err(e @ (WalletError::PermissionDenied(_) | WalletError::Disconnected)) => {
                debug!(error = %e, "wallet history denied, abandoning this channel");
                None
            }
            Err(e) => {
                debug!(error = %e, "wallet history lookup failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy 3 — public explorer trace
// ---------------------------------------------------------------------------

/// Queries a public ledger explorer for the transaction's execution
/// trace, after a short propagation delay.
pub struct ExplorerTraceResolver<L> {
    ledger: Arc<L>,
    delay: std::time::Duration,
}

impl<L> ExplorerTraceResolver<L> {
    /// Wrap the ledger endpoint with the configured propagation delay.
    pub fn new(ledger: Arc<L>, delay: std::time::Duration) -> Self {
        Self { ledger, delay }
    }
}

#[async_trait]
impl<L: LedgerQuery + 'static> CommitmentResolver for ExplorerTraceResolver<L> {
    fn name(&self) -> &'static str {
        "explorer-trace"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Option<Fr> {
        tokio::time::sleep(self.delay).await;
        match self.ledger.transaction_trace(ctx.best_id()).await {
            Ok(Some(trace)) => trace.first_field_output(ctx.function),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "explorer trace lookup failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Chain runner
// ---------------------------------------------------------------------------

/// The production chain, in protocol order: inline outputs, wallet
/// history, explorer trace.
pub fn default_resolver_chain<W, L>(
    wallet: Arc<W>,
    ledger: Arc<L>,
    explorer_delay: std::time::Duration,
) -> Vec<Box<dyn CommitmentResolver>>
where
    W: WalletConnector + 'static,
    L: LedgerQuery + 'static,
{
    vec![
        Box::new(StatusOutputResolver),
        Box::new(WalletHistoryResolver::new(wallet)),
        Box::new(ExplorerTraceResolver::new(ledger, explorer_delay)),
    ]
}

/// Run the strategies in order; first success wins.
pub async fn resolve_commitment(
    resolvers: &[Box<dyn CommitmentResolver>],
    ctx: &ResolutionContext<'_>,
) -> Option<Fr> {
    for resolver in resolvers {
        match resolver.resolve(ctx).await {
            Some(value) => {
                info!(strategy = resolver.name(), "commitment output recovered");
                return Some(value);
            }
            None => {
                debug!(strategy = resolver.name(), "strategy produced nothing, trying next");
            }
        }
    }
    None
}
