//! End-to-end payment lifecycle tests for the VEIL engine.
//!
//! These exercise the full path from invoice publication through
//! settlement bookkeeping against the in-memory devnet collaborators:
//! commitment derivation, link round trips, record selection, conversion,
//! freeze proofs, confirmation polling, hash resolution, and the index.
//!
//! Each test builds its own ledger/wallet/index rig. No shared state, no
//! ordering dependencies.

use std::sync::Arc;

use tokio::sync::watch;

use veil_engine::client::memory::{
    devnet_address, HistoryDenial, InMemoryIndex, InMemoryLedger, InMemoryWallet,
};
use veil_engine::client::{LedgerQuery, WalletConnector};
use veil_engine::config::{
    ProtocolConfig, INVOICE_PROGRAM, INVOICE_STATE_MAPPING, STABLE_PROGRAM,
};
use veil_engine::crypto::{derive_receipt_commitment, field_to_literal};
use veil_engine::flow::{
    InvoicePublisher, NewInvoice, PaymentError, PaymentFlow, PaymentStep, PublishedInvoice,
};
use veil_engine::invoice::{AssetKind, InvoiceKind, InvoiceStatus, OnChainInvoiceState};
use veil_engine::record::{render_balance_record, RecordData};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Rig {
    ledger: InMemoryLedger,
    merchant_wallet: InMemoryWallet,
    payer_wallet: InMemoryWallet,
    index: InMemoryIndex,
    cancel: watch::Receiver<bool>,
    _cancel_tx: watch::Sender<bool>,
}

fn rig() -> Rig {
    let ledger = InMemoryLedger::new();
    let merchant_wallet = InMemoryWallet::with_ledger(&merchant_address(), ledger.clone());
    let payer_wallet = InMemoryWallet::with_ledger(&payer_address(), ledger.clone());
    let index = InMemoryIndex::new();
    let (tx, rx) = watch::channel(false);
    Rig {
        ledger,
        merchant_wallet,
        payer_wallet,
        index,
        cancel: rx,
        _cancel_tx: tx,
    }
}

fn merchant_address() -> String {
    devnet_address(1)
}

fn payer_address() -> String {
    devnet_address(2)
}

async fn publish(rig: &Rig, amount: u64, asset: AssetKind, kind: InvoiceKind) -> PublishedInvoice {
    let mut publisher = InvoicePublisher::new(
        ProtocolConfig::devnet(),
        Arc::new(rig.merchant_wallet.clone()),
        Arc::new(rig.ledger.clone()),
        Arc::new(rig.index.clone()),
        rig.cancel.clone(),
    );
    publisher
        .publish(NewInvoice {
            merchant: merchant_address(),
            amount,
            asset,
            kind,
            memo: Some("integration".into()),
        })
        .await
        .expect("publication succeeds on the devnet")
}

fn payment_flow(rig: &Rig) -> PaymentFlow<InMemoryWallet, InMemoryLedger, InMemoryIndex> {
    PaymentFlow::new(
        ProtocolConfig::devnet(),
        Arc::new(rig.payer_wallet.clone()),
        Arc::new(rig.ledger.clone()),
        Arc::new(rig.index.clone()),
        rig.cancel.clone(),
    )
}

async fn onchain_state(rig: &Rig, published: &PublishedInvoice) -> OnChainInvoiceState {
    let commitment = field_to_literal(&published.invoice.commitment);
    let text = rig
        .ledger
        .mapping_value(INVOICE_PROGRAM, INVOICE_STATE_MAPPING, &commitment)
        .await
        .unwrap()
        .expect("published invoice has state");
    OnChainInvoiceState::parse(&text).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Full publish → pay lifecycle (primary asset)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_primary_payment_lifecycle() {
    let rig = rig();
    let published = publish(&rig, 1_000_000, AssetKind::Primary, InvoiceKind::Standard).await;

    // The link round-trips through its URL form.
    let reparsed = veil_engine::invoice::InvoiceLink::parse(&published.url).unwrap();
    assert_eq!(reparsed, published.link);

    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 1_500_000, AssetKind::Primary),
    );

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();

    assert_eq!(outcome.step, PaymentStep::Success);
    assert!(outcome.confirmed_id.is_some());
    let secret = outcome.payment_secret.expect("payer keeps the secret");
    assert_eq!(
        outcome.receipt_commitment,
        Some(derive_receipt_commitment(&secret, &published.invoice.salt))
    );

    // On-chain state flipped to settled.
    let state = onchain_state(&rig, &published).await;
    assert_eq!(state.status, InvoiceStatus::Settled);

    // The index cached the settlement.
    let entry = rig
        .index
        .entry(&field_to_literal(&published.invoice.commitment))
        .expect("bookkeeping ran");
    assert!(entry.settled);
    assert_eq!(entry.payment_transactions.len(), 1);
    assert_eq!(entry.payer.as_deref(), Some(payer_address().as_str()));
}

// ---------------------------------------------------------------------------
// 2. Receipt linkage: payer and merchant sides carry one commitment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn payer_and_merchant_receipts_share_the_commitment() {
    let rig = rig();
    let published = publish(&rig, 750_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 2_000_000, AssetKind::Primary),
    );

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();
    let expected = outcome.receipt_commitment.unwrap();

    // Payer side: the receipt record landed in the payer's wallet.
    let records = rig.payer_wallet.records(INVOICE_PROGRAM).await.unwrap();
    let payer_receipt = records
        .iter()
        .filter_map(|r| r.plaintext.as_deref())
        .find_map(|p| match RecordData::parse(p) {
            Ok(RecordData::PayerReceipt(data)) => Some(data),
            _ => None,
        })
        .expect("payer receipt exists");
    assert_eq!(payer_receipt.commitment, expected);

    // Merchant side: read the settle outputs from the execution trace.
    let trace = rig
        .ledger
        .transaction_trace(outcome.confirmed_id.as_deref().unwrap())
        .await
        .unwrap()
        .expect("devnet indexed the settlement");
    let merchant_receipt = trace
        .transitions
        .iter()
        .flat_map(|t| t.outputs.iter())
        .find_map(|o| match RecordData::parse(o) {
            Ok(RecordData::MerchantReceipt(data)) => Some(data),
            _ => None,
        })
        .expect("merchant receipt exists in outputs");
    assert_eq!(merchant_receipt.commitment, expected);
}

// ---------------------------------------------------------------------------
// 3. Idempotence: settled invoices short-circuit to AlreadyPaid
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settled_invoice_short_circuits_without_paying() {
    let rig = rig();
    let published = publish(&rig, 500_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 1_000_000, AssetKind::Primary),
    );

    let mut first = payment_flow(&rig);
    first.execute(&published.link, None).await.unwrap();

    // A second payer arrives at the same link.
    let second_wallet = InMemoryWallet::with_ledger(&devnet_address(3), rig.ledger.clone());
    let mut second = PaymentFlow::new(
        ProtocolConfig::devnet(),
        Arc::new(second_wallet.clone()),
        Arc::new(rig.ledger.clone()),
        Arc::new(rig.index.clone()),
        rig.cancel.clone(),
    );
    let outcome = second.execute(&published.link, None).await.unwrap();

    assert_eq!(outcome.step, PaymentStep::AlreadyPaid);
    assert!(outcome.payment_secret.is_none());
    // Pay was never invoked: the second wallet submitted nothing at all.
    assert!(second_wallet.submitted_requests().is_empty());
}

// ---------------------------------------------------------------------------
// 4. Conversion path: shortfall shields public balance first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insufficient_balance_converts_then_pays() {
    let rig = rig();
    let published = publish(&rig, 2_000_000, AssetKind::Primary, InvoiceKind::Standard).await;
    // 500k + 900k: total 1.4M < 2M, plain insufficiency.
    for amount in [500_000u64, 900_000] {
        rig.payer_wallet.mint_record(
            INVOICE_PROGRAM,
            render_balance_record(&payer_address(), amount, AssetKind::Primary),
        );
    }

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();
    assert_eq!(outcome.step, PaymentStep::Success);

    let functions: Vec<String> = rig
        .payer_wallet
        .submitted_requests()
        .iter()
        .map(|r| r.function.clone())
        .collect();
    assert_eq!(functions, vec!["shield", "settle_invoice"]);
}

#[tokio::test]
async fn fragmented_balance_also_routes_through_conversion() {
    let rig = rig();
    let published = publish(&rig, 2_000_000, AssetKind::Primary, InvoiceKind::Standard).await;
    // 1M + 1.5M: total 2.5M >= 2M but no single record suffices.
    for amount in [1_000_000u64, 1_500_000] {
        rig.payer_wallet.mint_record(
            INVOICE_PROGRAM,
            render_balance_record(&payer_address(), amount, AssetKind::Primary),
        );
    }

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();
    assert_eq!(outcome.step, PaymentStep::Success);
    assert!(rig
        .payer_wallet
        .submitted_requests()
        .iter()
        .any(|r| r.function == "shield"));
}

// ---------------------------------------------------------------------------
// 5. Wrapped-stable path: freeze-proof pair travels with the settle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stable_settlement_carries_the_proof_pair() {
    let rig = rig();
    let published = publish(&rig, 900_000, AssetKind::WrappedStable, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        STABLE_PROGRAM,
        render_balance_record(&payer_address(), 5_000_000, AssetKind::WrappedStable),
    );

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();
    assert_eq!(outcome.step, PaymentStep::Success);

    let settle = rig
        .payer_wallet
        .submitted_requests()
        .into_iter()
        .find(|r| r.function == "settle_stable_invoice")
        .expect("stable settle submitted");
    // record, merchant, amount, salt, secret + the two proof instances.
    assert_eq!(settle.inputs.len(), 7);
    assert_eq!(settle.inputs[5], settle.inputs[6]);
    assert!(settle.inputs[5].contains("siblings: ["));
}

#[tokio::test]
async fn stable_shortfall_is_terminal_not_converted() {
    // wUSD has no public pool to shield from; a shortfall surfaces as a
    // selection error instead of routing through Convert.
    let rig = rig();
    let published = publish(&rig, 900_000, AssetKind::WrappedStable, InvoiceKind::Standard).await;

    let mut flow = payment_flow(&rig);
    let err = flow.execute(&published.link, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::Selection(_)));
    assert!(rig.payer_wallet.submitted_requests().is_empty());
}

// ---------------------------------------------------------------------------
// 6. Multi-pay invoices stay open across settlements
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multipay_invoice_accepts_repeat_payments() {
    let rig = rig();
    let published = publish(&rig, 250_000, AssetKind::Primary, InvoiceKind::MultiPay).await;

    for seed in [4u8, 5] {
        let wallet = InMemoryWallet::with_ledger(&devnet_address(seed), rig.ledger.clone());
        wallet.mint_record(
            INVOICE_PROGRAM,
            render_balance_record(&devnet_address(seed), 1_000_000, AssetKind::Primary),
        );
        let mut flow = PaymentFlow::new(
            ProtocolConfig::devnet(),
            Arc::new(wallet),
            Arc::new(rig.ledger.clone()),
            Arc::new(rig.index.clone()),
            rig.cancel.clone(),
        );
        let outcome = flow.execute(&published.link, None).await.unwrap();
        assert_eq!(outcome.step, PaymentStep::Success);
    }

    // Still open on-chain, and the index kept both payments without
    // marking it settled.
    let state = onchain_state(&rig, &published).await;
    assert_eq!(state.status, InvoiceStatus::Open);
    let entry = rig
        .index
        .entry(&field_to_literal(&published.invoice.commitment))
        .unwrap();
    assert!(!entry.settled);
    assert_eq!(entry.payment_transactions.len(), 2);
}

// ---------------------------------------------------------------------------
// 7. Donation: commitment pinned to zero, settlement uses the real amount
// ---------------------------------------------------------------------------

#[tokio::test]
async fn donation_pays_chosen_amount_against_zero_commitment() {
    let rig = rig();
    let published = publish(&rig, 0, AssetKind::Primary, InvoiceKind::Donation).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 10_000_000, AssetKind::Primary),
    );

    let mut flow = payment_flow(&rig);
    // Donations require an explicit amount.
    let err = flow.execute(&published.link, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidInvoice { .. }));

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, Some(3_000_000)).await.unwrap();
    assert_eq!(outcome.step, PaymentStep::Success);

    let settle = rig
        .payer_wallet
        .submitted_requests()
        .into_iter()
        .find(|r| r.function == "settle_invoice")
        .unwrap();
    assert_eq!(settle.inputs[2], "3000000u64");
}

// ---------------------------------------------------------------------------
// 8. Failure routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejection_surfaces_as_rejected_not_timeout() {
    let rig = rig();
    let published = publish(&rig, 100_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 500_000, AssetKind::Primary),
    );
    rig.payer_wallet.reject_next_transition("nullifier already seen");

    let mut flow = payment_flow(&rig);
    let err = flow.execute(&published.link, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::Rejected { .. }));
    assert!(!err.is_retryable());
    assert!(flow.attempt().last_error.is_some());
}

#[tokio::test]
async fn hash_unrecoverable_when_every_channel_is_dark() {
    let rig = rig();
    let published = publish(&rig, 100_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 500_000, AssetKind::Primary),
    );
    // Strategy 1: no inline outputs. Strategy 2: permission denied.
    // Strategy 3: the explorer never indexed the transaction.
    rig.payer_wallet.suppress_inline_outputs();
    rig.payer_wallet.deny_history(HistoryDenial::PermissionDenied);
    rig.payer_wallet.skip_trace_publication();

    let mut flow = payment_flow(&rig);
    let err = flow.execute(&published.link, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::HashUnrecoverable { .. }));

    // The transition itself went through; the chain settled even though
    // the client could not confirm the output.
    let state = onchain_state(&rig, &published).await;
    assert_eq!(state.status, InvoiceStatus::Settled);
}

#[tokio::test]
async fn bookkeeping_failure_does_not_fail_the_payment() {
    let rig = rig();
    let published = publish(&rig, 100_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 500_000, AssetKind::Primary),
    );
    rig.index.fail_writes();

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();

    // On-chain settlement is authoritative; the cache being down is a
    // log line, not a failure.
    assert_eq!(outcome.step, PaymentStep::Success);
    let state = onchain_state(&rig, &published).await;
    assert_eq!(state.status, InvoiceStatus::Settled);
}

#[tokio::test]
async fn hash_resolution_falls_back_to_the_explorer() {
    let rig = rig();
    let published = publish(&rig, 100_000, AssetKind::Primary, InvoiceKind::Standard).await;
    rig.payer_wallet.mint_record(
        INVOICE_PROGRAM,
        render_balance_record(&payer_address(), 500_000, AssetKind::Primary),
    );
    // Outputs withheld and history denied, but the devnet "explorer"
    // indexed the trace: strategy three carries it.
    rig.payer_wallet.suppress_inline_outputs();
    rig.payer_wallet.deny_history(HistoryDenial::CapabilityUnavailable);

    let mut flow = payment_flow(&rig);
    let outcome = flow.execute(&published.link, None).await.unwrap();
    assert_eq!(outcome.step, PaymentStep::Success);
}
