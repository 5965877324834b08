//! # Payment Lifecycle Controller
//!
//! The top-level state machine a payment session walks through:
//!
//! ```text
//! Connect → Verify → ┬───────────→ Pay → Success
//!                    ├→ Convert ──↗
//!                    └→ AlreadyPaid
//! ```
//!
//! - **Connect** waits (bounded, cancellable) for a wallet identity.
//! - **Verify** resolves the link against the ledger: look up the stored
//!   commitment by salt, recompute it locally from the link parameters,
//!   and compare. Any mismatch or missing mapping is a forged or
//!   corrupted invoice — fatal, never retried. An invoice the chain
//!   already reports settled short-circuits to **AlreadyPaid**; paying
//!   twice is never attempted.
//! - **Convert** is entered only when record selection reports a
//!   shortfall and the asset supports shielding public balance. The
//!   conversion is sized to the requirement plus a safety buffer and
//!   polled to confirmation before selection is retried.
//! - **Pay** selects a record, builds the freeze-proof pair for the
//!   wrapped-stable path, submits with a fresh payment secret, polls,
//!   recovers the commitment output through the resolver chain, and then
//!   does best-effort index bookkeeping. Bookkeeping failures are logged
//!   and dropped — on-chain settlement is authoritative.
//!
//! One controller instance drives one payment session; it holds no state
//! shared with other sessions and is discarded when the host surface
//! navigates away. Cancellation is a `watch` flag checked before every
//! network call — after cancellation the controller makes no further
//! calls and mutates nothing.

use std::sync::Arc;

use ark_bn254::Fr;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::index::{InvoiceIndex, InvoiceMetadata, SettlementUpdate};
use crate::client::ledger::LedgerQuery;
use crate::client::wallet::{TransitionRequest, WalletConnector};
use crate::compliance::{leaf_index_for, FreezeProofBuilder, RegistryView};
use crate::config::ProtocolConfig;
use crate::crypto::hash::{field_from_literal, field_to_literal};
use crate::crypto::{
    derive_invoice_commitment, derive_receipt_commitment, generate_payment_secret, generate_salt,
};
use crate::invoice::link::{InvoiceLink, DEFAULT_LINK_BASE};
use crate::invoice::types::{
    validate_address, AssetKind, Invoice, InvoiceKind, InvoiceStatus, OnChainInvoiceState,
};
use crate::record::selector::{RecordSelector, SelectedRecord, SelectionError};
use crate::flow::error::PaymentError;
use crate::flow::polling::{poll_until_final, PollOutcome, RetryPolicy};
use crate::flow::resolve::{
    default_resolver_chain, resolve_commitment, CommitmentResolver, ResolutionContext,
};

// ---------------------------------------------------------------------------
// Steps & session state
// ---------------------------------------------------------------------------

/// Where in the lifecycle a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStep {
    /// Waiting for a wallet identity.
    Connect,
    /// Checking the invoice against the ledger.
    Verify,
    /// Shielding public balance to cover a shortfall.
    Convert,
    /// Submitting and confirming the settle transition.
    Pay,
    /// Terminal: paid in this session.
    Success,
    /// Terminal: the chain already reported the invoice settled.
    AlreadyPaid,
}

impl std::fmt::Display for PaymentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Verify => "verify",
            Self::Convert => "convert",
            Self::Pay => "pay",
            Self::Success => "success",
            Self::AlreadyPaid => "already-paid",
        };
        f.write_str(s)
    }
}

/// Observable state of one payment session, owned exclusively by its
/// controller and discarded with it.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    /// Session identifier for log correlation.
    pub attempt_id: Uuid,
    /// Current lifecycle step.
    pub step: PaymentStep,
    /// Transient id of the most recent submission.
    pub transient_id: Option<String>,
    /// Confirmed id of the most recent confirmation.
    pub confirmed_id: Option<String>,
    /// Polls used by the most recent confirmation wait.
    pub attempt_count: u32,
    /// Rendered form of the last error, for the host surface.
    pub last_error: Option<String>,
}

impl PaymentAttempt {
    fn new() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            step: PaymentStep::Connect,
            transient_id: None,
            confirmed_id: None,
            attempt_count: 0,
            last_error: None,
        }
    }
}

/// A link that survived verification, together with the chain's view.
#[derive(Debug, Clone)]
pub struct VerifiedInvoice {
    /// The resolved invoice. `asset` and `kind` come from the chain,
    /// which is authoritative over whatever the link claimed.
    pub invoice: Invoice,
    /// The on-chain state block at verification time.
    pub state: OnChainInvoiceState,
}

/// Terminal result of a payment session.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// `Success` or `AlreadyPaid`.
    pub step: PaymentStep,
    /// Confirmed transaction id of the settlement, when this session
    /// performed one.
    pub confirmed_id: Option<String>,
    /// The payment secret. For multi-pay and donation invoices the user
    /// must retain this to later prove which contribution was theirs.
    pub payment_secret: Option<Fr>,
    /// The receipt commitment appearing in both receipt records.
    pub receipt_commitment: Option<Fr>,
}

// ---------------------------------------------------------------------------
// PaymentFlow
// ---------------------------------------------------------------------------

/// Drives one invoice payment end to end.
pub struct PaymentFlow<W, L, I> {
    config: ProtocolConfig,
    wallet: Arc<W>,
    ledger: Arc<L>,
    index: Arc<I>,
    cancel: watch::Receiver<bool>,
    attempt: PaymentAttempt,
}

impl<W, L, I> PaymentFlow<W, L, I>
where
    W: WalletConnector + 'static,
    L: LedgerQuery + 'static,
    I: InvoiceIndex,
{
    /// Create a controller for one payment session. The `cancel` watch
    /// flag belongs to the host surface; flipping it to `true` stops the
    /// flow before its next network call.
    pub fn new(
        config: ProtocolConfig,
        wallet: Arc<W>,
        ledger: Arc<L>,
        index: Arc<I>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            wallet,
            ledger,
            index,
            cancel,
            attempt: PaymentAttempt::new(),
        }
    }

    /// Observable session state.
    pub fn attempt(&self) -> &PaymentAttempt {
        &self.attempt
    }

    /// Run the full lifecycle for `link`. `pay_amount` overrides the
    /// link amount and is required for open-ended (zero-amount) links.
    pub async fn execute(
        &mut self,
        link: &InvoiceLink,
        pay_amount: Option<u64>,
    ) -> Result<PaymentOutcome, PaymentError> {
        let result = self.run(link, pay_amount).await;
        if let Err(e) = &result {
            // Cancellation is not an error of the attempt, it is the end
            // of the session; leave no trace in the attempt state.
            if !matches!(e, PaymentError::Cancelled) {
                self.attempt.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn run(
        &mut self,
        link: &InvoiceLink,
        pay_amount: Option<u64>,
    ) -> Result<PaymentOutcome, PaymentError> {
        self.attempt.step = PaymentStep::Connect;
        let payer = self.connect().await?;
        info!(attempt = %self.attempt.attempt_id, payer = %payer, "wallet connected");

        self.attempt.step = PaymentStep::Verify;
        let verified = self.verify(link).await?;

        if verified.state.status == InvoiceStatus::Settled {
            info!(attempt = %self.attempt.attempt_id, "invoice already settled on-chain");
            self.attempt.step = PaymentStep::AlreadyPaid;
            return Ok(PaymentOutcome {
                step: PaymentStep::AlreadyPaid,
                confirmed_id: None,
                payment_secret: None,
                receipt_commitment: None,
            });
        }

        let amount = pay_amount.unwrap_or(verified.invoice.amount);
        if amount == 0 {
            return Err(PaymentError::InvalidInvoice {
                reason: "open-ended invoice requires an explicit payment amount".into(),
            });
        }

        self.attempt.step = PaymentStep::Pay;
        self.pay(&verified.invoice, amount, &payer).await
    }

    /// Wait for the wallet to expose an identity. Purely local to the
    /// connector — no ledger calls happen here.
    async fn connect(&mut self) -> Result<String, PaymentError> {
        let policy = RetryPolicy::from_config(&self.config);
        for attempt in 1..=policy.max_attempts {
            if *self.cancel.borrow() {
                return Err(PaymentError::Cancelled);
            }
            if let Some(address) = self.wallet.identity().await? {
                return Ok(address);
            }
            if attempt < policy.max_attempts && self.pause(policy.interval).await {
                return Err(PaymentError::Cancelled);
            }
        }
        Err(PaymentError::Timeout {
            attempts: policy.max_attempts,
        })
    }

    /// Resolve and verify the invoice the link points at.
    ///
    /// Order matters: the stored commitment is fetched first (by salt),
    /// then the state block (by commitment) — the state's invoice kind
    /// decides whether the local recomputation pins the amount to zero.
    pub async fn verify(&mut self, link: &InvoiceLink) -> Result<VerifiedInvoice, PaymentError> {
        let salt_literal = field_to_literal(&link.salt);

        let stored_literal = self
            .ledger
            .mapping_value(
                &self.config.invoice_program,
                &self.config.commitment_mapping,
                &salt_literal,
            )
            .await?
            .ok_or_else(|| PaymentError::InvalidInvoice {
                reason: "no commitment is mapped under the link's salt".into(),
            })?;
        let stored = field_from_literal(&stored_literal).map_err(|e| {
            PaymentError::InvalidInvoice {
                reason: format!("stored commitment does not decode: {e}"),
            }
        })?;

        let state_text = self
            .ledger
            .mapping_value(
                &self.config.invoice_program,
                &self.config.invoice_state_mapping,
                &stored_literal,
            )
            .await?
            .ok_or_else(|| PaymentError::InvalidInvoice {
                reason: "commitment has no invoice state on-chain".into(),
            })?;
        let state =
            OnChainInvoiceState::parse(&state_text).map_err(|e| PaymentError::InvalidInvoice {
                reason: format!("invoice state does not parse: {e}"),
            })?;

        let expected = derive_invoice_commitment(
            &link.merchant,
            state.kind.commitment_amount(link.amount),
            &link.salt,
        );
        if expected != stored {
            return Err(PaymentError::InvalidInvoice {
                reason: "locally recomputed commitment does not match the on-chain value".into(),
            });
        }

        if link.asset != state.asset || link.kind != state.kind {
            // The chain wins; a stale link still pays the right invoice.
            warn!(
                link_asset = %link.asset, chain_asset = %state.asset,
                link_kind = %link.kind, chain_kind = %state.kind,
                "link metadata disagrees with chain state, using chain state"
            );
        }

        Ok(VerifiedInvoice {
            invoice: Invoice {
                merchant: link.merchant.clone(),
                amount: link.amount,
                salt: link.salt,
                commitment: stored,
                asset: state.asset,
                kind: state.kind,
                memo: link.memo.clone(),
            },
            state,
        })
    }

    /// Select a record, converting public balance once if the asset
    /// allows it and the first selection reports a shortfall.
    async fn select_with_conversion(
        &mut self,
        asset: AssetKind,
        amount: u64,
    ) -> Result<SelectedRecord, PaymentError> {
        let program = self
            .config
            .record_program_for(asset.requires_freeze_proof())
            .to_string();

        let first = RecordSelector::new(self.wallet.as_ref(), &self.config)
            .select(&program, asset, amount)
            .await;
        match first {
            Ok(record) => Ok(record),
            Err(shortfall @ (SelectionError::Insufficient { .. }
            | SelectionError::Fragmented { .. }))
                if asset.supports_public_conversion() =>
            {
                info!(reason = %shortfall, "shortfall; converting public balance");
                self.attempt.step = PaymentStep::Convert;
                self.convert(amount).await?;
                self.attempt.step = PaymentStep::Pay;

                Ok(RecordSelector::new(self.wallet.as_ref(), &self.config)
                    .select(&program, asset, amount)
                    .await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shield public balance into a private record sized to the
    /// requirement plus the safety buffer, and wait for confirmation.
    async fn convert(&mut self, amount: u64) -> Result<(), PaymentError> {
        let sized = amount.saturating_add(self.config.conversion_buffer_grains);
        let request = TransitionRequest {
            program: self.config.invoice_program.clone(),
            function: self.config.shield_function.clone(),
            inputs: vec![format!("{sized}u64")],
            fee_grains: self.config.fee_grains,
        };
        let (_, outcome) = self.submit_and_confirm(request).await?;
        debug!(
            grains = sized,
            polls = outcome.attempts,
            "conversion confirmed"
        );
        Ok(())
    }

    /// The Pay step proper: record, proofs, secret, submission,
    /// confirmation, hash resolution, bookkeeping.
    async fn pay(
        &mut self,
        invoice: &Invoice,
        amount: u64,
        payer: &str,
    ) -> Result<PaymentOutcome, PaymentError> {
        let stable = invoice.asset.requires_freeze_proof();
        let record = self.select_with_conversion(invoice.asset, amount).await?;
        debug!(record_value = record.data.amount, "record selected");

        let secret = generate_payment_secret();
        let receipt_commitment = derive_receipt_commitment(&secret, &invoice.salt);

        let mut inputs = vec![
            record.plaintext.clone(),
            invoice.merchant.clone(),
            format!("{amount}u64"),
            field_to_literal(&invoice.salt),
            field_to_literal(&secret),
        ];
        if stable {
            let registry = RegistryView::fetch(self.ledger.as_ref(), &self.config).await?;
            let proof = FreezeProofBuilder::build(&registry, leaf_index_for(payer))?;
            let wire = proof.to_wire();
            // The settle transition takes the proof twice.
            inputs.push(wire.clone());
            inputs.push(wire);
        }

        let function = self.config.settle_function_for(stable).to_string();
        let request = TransitionRequest {
            program: self.config.invoice_program.clone(),
            function: function.clone(),
            inputs,
            fee_grains: self.config.fee_grains,
        };
        let (transient_id, outcome) = self.submit_and_confirm(request).await?;
        let confirmed_id = outcome.report.confirmed_id.clone();

        let ctx = ResolutionContext {
            transient_id: &transient_id,
            confirmed_id: confirmed_id.as_deref(),
            function: &function,
            final_report: Some(&outcome.report),
        };
        let resolved = resolve_commitment(&self.resolvers(), &ctx)
            .await
            .ok_or_else(|| PaymentError::HashUnrecoverable {
                transient_id: transient_id.clone(),
            })?;
        if resolved != invoice.commitment {
            warn!(
                resolved = %field_to_literal(&resolved),
                expected = %field_to_literal(&invoice.commitment),
                "settled commitment output differs from the verified invoice"
            );
        }

        // Best-effort bookkeeping. The chain settled; the cache catching
        // up (or not) changes nothing.
        let update = SettlementUpdate {
            settled: !invoice.kind.allows_repeat_payment(),
            payment_transaction: confirmed_id.clone().unwrap_or_else(|| transient_id.clone()),
            payer: Some(payer.to_string()),
        };
        if let Err(e) = self
            .index
            .record_settlement(&field_to_literal(&invoice.commitment), update)
            .await
        {
            warn!(error = %e, "off-chain bookkeeping failed; on-chain settlement stands");
        }

        self.attempt.step = PaymentStep::Success;
        Ok(PaymentOutcome {
            step: PaymentStep::Success,
            confirmed_id: confirmed_id.or(Some(transient_id)),
            payment_secret: Some(secret),
            receipt_commitment: Some(receipt_commitment),
        })
    }

    /// Submit a transition and poll it to confirmation, recording the
    /// ids and poll count in the attempt state.
    async fn submit_and_confirm(
        &mut self,
        request: TransitionRequest,
    ) -> Result<(String, PollOutcome), PaymentError> {
        if *self.cancel.borrow() {
            return Err(PaymentError::Cancelled);
        }
        let transient_id = self.wallet.submit_transition(request).await?;
        self.attempt.transient_id = Some(transient_id.clone());

        let policy = RetryPolicy::from_config(&self.config);
        let mut cancel = self.cancel.clone();
        let outcome =
            poll_until_final(self.wallet.as_ref(), &transient_id, &policy, &mut cancel).await?;
        self.attempt.attempt_count = outcome.attempts;
        self.attempt.confirmed_id = outcome.report.confirmed_id.clone();
        Ok((transient_id, outcome))
    }

    /// The resolution chain, in the order the strategies are tried.
    fn resolvers(&self) -> Vec<Box<dyn CommitmentResolver>> {
        default_resolver_chain(
            Arc::clone(&self.wallet),
            Arc::clone(&self.ledger),
            self.config.explorer_propagation_delay,
        )
    }

    /// Sleep, waking early on cancellation. Returns `true` if cancelled.
    async fn pause(&self, duration: std::time::Duration) -> bool {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = cancel.changed() => *cancel.borrow(),
        }
    }
}

// ---------------------------------------------------------------------------
// InvoicePublisher
// ---------------------------------------------------------------------------

/// Parameters of an invoice to publish.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    /// Merchant address the payments will go to.
    pub merchant: String,
    /// Requested amount; zero for open donations.
    pub amount: u64,
    /// Asset to denominate in.
    pub asset: AssetKind,
    /// Invoice kind.
    pub kind: InvoiceKind,
    /// Display memo carried in the link.
    pub memo: Option<String>,
}

/// A published invoice: the on-chain commitment plus the shareable link.
#[derive(Debug, Clone)]
pub struct PublishedInvoice {
    /// The invoice as published.
    pub invoice: Invoice,
    /// The link parameter set.
    pub link: InvoiceLink,
    /// The rendered URL.
    pub url: String,
    /// Confirmed publication transaction id.
    pub confirmed_id: Option<String>,
}

/// Publishes merchant invoices. Same collaborator wiring and the same
/// resolver chain as the payment flow — the publication transition also
/// outputs the commitment, and it is recovered the same way.
pub struct InvoicePublisher<W, L, I> {
    config: ProtocolConfig,
    wallet: Arc<W>,
    ledger: Arc<L>,
    index: Arc<I>,
    cancel: watch::Receiver<bool>,
}

impl<W, L, I> InvoicePublisher<W, L, I>
where
    W: WalletConnector + 'static,
    L: LedgerQuery + 'static,
    I: InvoiceIndex,
{
    /// Create a publisher.
    pub fn new(
        config: ProtocolConfig,
        wallet: Arc<W>,
        ledger: Arc<L>,
        index: Arc<I>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            wallet,
            ledger,
            index,
            cancel,
        }
    }

    /// Publish a new invoice: fresh salt, locally derived commitment,
    /// submission, confirmation, hash recovery, link, and best-effort
    /// index registration.
    pub async fn publish(&mut self, new: NewInvoice) -> Result<PublishedInvoice, PaymentError> {
        validate_address(&new.merchant).map_err(|e| PaymentError::InvalidInvoice {
            reason: e.to_string(),
        })?;

        let salt = generate_salt();
        let commitment = derive_invoice_commitment(
            &new.merchant,
            new.kind.commitment_amount(new.amount),
            &salt,
        );

        let request = TransitionRequest {
            program: self.config.invoice_program.clone(),
            function: self.config.publish_function.clone(),
            inputs: vec![
                new.merchant.clone(),
                format!("{}u64", new.kind.commitment_amount(new.amount)),
                field_to_literal(&salt),
                field_to_literal(&commitment),
                new.asset.wire_token().to_string(),
                new.kind.wire_token().to_string(),
            ],
            fee_grains: self.config.fee_grains,
        };
        if *self.cancel.borrow() {
            return Err(PaymentError::Cancelled);
        }
        let transient_id = self.wallet.submit_transition(request).await?;

        let policy = RetryPolicy::from_config(&self.config);
        let mut cancel = self.cancel.clone();
        let outcome =
            poll_until_final(self.wallet.as_ref(), &transient_id, &policy, &mut cancel).await?;
        let confirmed_id = outcome.report.confirmed_id.clone();

        let ctx = ResolutionContext {
            transient_id: &transient_id,
            confirmed_id: confirmed_id.as_deref(),
            function: &self.config.publish_function,
            final_report: Some(&outcome.report),
        };
        let resolvers = default_resolver_chain(
            Arc::clone(&self.wallet),
            Arc::clone(&self.ledger),
            self.config.explorer_propagation_delay,
        );
        let resolved = resolve_commitment(&resolvers, &ctx).await.ok_or_else(|| {
            PaymentError::HashUnrecoverable {
                transient_id: transient_id.clone(),
            }
        })?;
        if resolved != commitment {
            warn!(
                resolved = %field_to_literal(&resolved),
                expected = %field_to_literal(&commitment),
                "published commitment output differs from the local derivation"
            );
        }

        let now = Utc::now();
        let metadata = InvoiceMetadata {
            commitment: field_to_literal(&commitment),
            merchant_cipher: None,
            amount: new.amount,
            asset: new.asset.wire_token().to_string(),
            kind: new.kind.wire_token().to_string(),
            settled: false,
            payment_transactions: Vec::new(),
            payer: None,
            memo: new.memo.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.index.register(metadata).await {
            warn!(error = %e, "invoice index registration failed; link remains payable");
        }

        let link = InvoiceLink {
            merchant: new.merchant.clone(),
            amount: new.amount,
            salt,
            asset: new.asset,
            kind: new.kind,
            memo: new.memo,
        };
        let url = link
            .to_url(DEFAULT_LINK_BASE)
            .map_err(|e| PaymentError::InvalidInvoice {
                reason: format!("link rendering failed: {e}"),
            })?;

        Ok(PublishedInvoice {
            invoice: Invoice {
                merchant: new.merchant,
                amount: new.amount,
                salt,
                commitment,
                asset: new.asset,
                kind: new.kind,
                memo: link.memo.clone(),
            },
            link,
            url,
            confirmed_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{devnet_address, InMemoryIndex, InMemoryLedger, InMemoryWallet};

    fn rig() -> (
        InMemoryLedger,
        InMemoryWallet,
        InMemoryIndex,
        watch::Sender<bool>,
        watch::Receiver<bool>,
    ) {
        let ledger = InMemoryLedger::new();
        let wallet = InMemoryWallet::with_ledger(&devnet_address(10), ledger.clone());
        let index = InMemoryIndex::new();
        let (tx, rx) = watch::channel(false);
        (ledger, wallet, index, tx, rx)
    }

    async fn published_link(
        ledger: &InMemoryLedger,
        wallet: &InMemoryWallet,
        index: &InMemoryIndex,
        cancel: watch::Receiver<bool>,
        kind: InvoiceKind,
        amount: u64,
    ) -> InvoiceLink {
        let mut publisher = InvoicePublisher::new(
            ProtocolConfig::devnet(),
            Arc::new(wallet.clone()),
            Arc::new(ledger.clone()),
            Arc::new(index.clone()),
            cancel,
        );
        publisher
            .publish(NewInvoice {
                merchant: devnet_address(20),
                amount,
                asset: AssetKind::Primary,
                kind,
                memo: None,
            })
            .await
            .unwrap()
            .link
    }

    #[tokio::test]
    async fn verify_rejects_unknown_salt() {
        let (ledger, wallet, index, _tx, rx) = rig();
        let mut flow = PaymentFlow::new(
            ProtocolConfig::devnet(),
            Arc::new(wallet),
            Arc::new(ledger),
            Arc::new(index),
            rx,
        );

        let link = InvoiceLink {
            merchant: devnet_address(20),
            amount: 1_000_000,
            salt: Fr::from(555u64),
            asset: AssetKind::Primary,
            kind: InvoiceKind::Standard,
            memo: None,
        };
        let err = flow.verify(&link).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidInvoice { .. }));
    }

    #[tokio::test]
    async fn verify_rejects_tampered_amount() {
        let (ledger, wallet, index, _tx, rx) = rig();
        let link = published_link(&ledger, &wallet, &index, rx.clone(), InvoiceKind::Standard, 1_000_000)
            .await;

        let mut flow = PaymentFlow::new(
            ProtocolConfig::devnet(),
            Arc::new(wallet),
            Arc::new(ledger),
            Arc::new(index),
            rx,
        );

        // Tamper with the amount; the recomputed commitment must diverge.
        let mut tampered = link;
        tampered.amount = 999;
        let err = flow.verify(&tampered).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidInvoice { .. }));
    }

    #[tokio::test]
    async fn donation_link_verifies_with_any_amount() {
        let (ledger, wallet, index, _tx, rx) = rig();
        let link =
            published_link(&ledger, &wallet, &index, rx.clone(), InvoiceKind::Donation, 0).await;

        let mut flow = PaymentFlow::new(
            ProtocolConfig::devnet(),
            Arc::new(wallet),
            Arc::new(ledger),
            Arc::new(index),
            rx,
        );

        // A donation link carries whatever amount the payer typed in;
        // the zero-amount convention makes them all verify.
        let mut with_amount = link;
        with_amount.amount = 3_500_000;
        let verified = flow.verify(&with_amount).await.unwrap();
        assert_eq!(verified.state.kind, InvoiceKind::Donation);
    }

    #[tokio::test]
    async fn connect_waits_for_identity() {
        let (ledger, merchant_wallet, index, _tx, rx) = rig();
        let link = published_link(
            &ledger,
            &merchant_wallet,
            &index,
            rx.clone(),
            InvoiceKind::Standard,
            1_000,
        )
        .await;

        // The payer's wallet has not been approved yet.
        let payer_wallet = InMemoryWallet::awaiting_connection(ledger.clone());
        let mut flow = PaymentFlow::new(
            ProtocolConfig::devnet(),
            Arc::new(payer_wallet.clone()),
            Arc::new(ledger),
            Arc::new(index),
            rx,
        );

        // Approve the connection shortly after the flow starts waiting.
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            payer_wallet.set_identity(&devnet_address(11));
        });

        // The payer has no records, so the flow converts and then pays.
        let outcome = flow.execute(&link, None).await.unwrap();
        assert_eq!(outcome.step, PaymentStep::Success);
        assert!(outcome.payment_secret.is_some());
    }
}
