// Copyright (c) 2026 Veil Labs. MIT License.
// See LICENSE for details.

//! # VEIL CLI
//!
//! Entry point for the `veil` binary. Parses CLI arguments, initializes
//! logging, and dispatches to the subcommands:
//!
//! - `new`     — generate an invoice (salt, commitment, link), offline
//! - `link`    — decode an invoice link and recompute its commitment
//! - `demo`    — run a publish → pay lifecycle on the in-process devnet
//! - `version` — print build version information

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;

use veil_engine::client::memory::{devnet_address, InMemoryIndex, InMemoryLedger, InMemoryWallet};
use veil_engine::config::ProtocolConfig;
use veil_engine::crypto::{derive_invoice_commitment, field_to_literal, generate_salt};
use veil_engine::flow::{InvoicePublisher, NewInvoice, PaymentFlow, PaymentStep};
use veil_engine::invoice::{
    validate_address, AssetKind, InvoiceKind, InvoiceLink, DEFAULT_LINK_BASE,
};
use veil_engine::record::render_balance_record;

use cli::{Commands, DemoArgs, LinkArgs, NewArgs, VeilCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging("veil_cli=info,veil_engine=info", LogFormat::Pretty);

    let cli = VeilCli::parse();
    match cli.command {
        Commands::New(args) => new_invoice(args),
        Commands::Link(args) => decode_link(args),
        Commands::Demo(args) => run_demo(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn parse_asset(token: &str) -> Result<AssetKind> {
    AssetKind::from_wire_token(token).with_context(|| format!("unknown asset token {token:?}"))
}

fn parse_kind(kind: &str) -> Result<InvoiceKind> {
    InvoiceKind::from_wire_token(kind).with_context(|| format!("unknown invoice kind {kind:?}"))
}

/// Generate a fresh invoice offline: salt, commitment, and link. The
/// invoice becomes payable once the commitment is published on-chain.
fn new_invoice(args: NewArgs) -> Result<()> {
    validate_address(&args.merchant).context("merchant address")?;
    let asset = parse_asset(&args.token)?;
    let kind = parse_kind(&args.kind)?;
    if args.amount == 0 && kind != InvoiceKind::Donation {
        bail!("amount may only be zero for donation invoices");
    }

    let salt = generate_salt();
    let commitment =
        derive_invoice_commitment(&args.merchant, kind.commitment_amount(args.amount), &salt);
    let link = InvoiceLink {
        merchant: args.merchant,
        amount: args.amount,
        salt,
        asset,
        kind,
        memo: args.memo,
    };
    let url = link.to_url(DEFAULT_LINK_BASE)?;

    println!("salt:       {}", field_to_literal(&salt));
    println!("commitment: {}", field_to_literal(&commitment));
    println!("link:       {url}");
    println!();
    println!("publish the commitment under this salt to make the link payable");
    Ok(())
}

/// Decode a link and recompute the commitment it must be bound to.
fn decode_link(args: LinkArgs) -> Result<()> {
    let link = InvoiceLink::parse(&args.url).context("decoding invoice link")?;
    let commitment = derive_invoice_commitment(
        &link.merchant,
        link.kind.commitment_amount(link.amount),
        &link.salt,
    );

    println!("merchant:   {}", link.merchant);
    println!("amount:     {} grains", link.amount);
    println!("asset:      {}", link.asset);
    println!("kind:       {}", link.kind);
    if let Some(memo) = &link.memo {
        println!("memo:       {memo}");
    }
    println!("salt:       {}", field_to_literal(&link.salt));
    println!("commitment: {}", field_to_literal(&commitment));
    Ok(())
}

/// Run the full publish → pay lifecycle against the in-process devnet.
async fn run_demo(args: DemoArgs) -> Result<()> {
    let asset = parse_asset(&args.token)?;
    let kind = parse_kind(&args.kind)?;
    let config = ProtocolConfig::devnet();

    let ledger = InMemoryLedger::new();
    let merchant_wallet = InMemoryWallet::with_ledger(&devnet_address(1), ledger.clone());
    let payer_wallet = InMemoryWallet::with_ledger(&devnet_address(2), ledger.clone());
    let index = InMemoryIndex::new();
    let (_cancel_tx, cancel) = watch::channel(false);

    // Merchant publishes.
    let mut publisher = InvoicePublisher::new(
        config.clone(),
        Arc::new(merchant_wallet),
        Arc::new(ledger.clone()),
        Arc::new(index.clone()),
        cancel.clone(),
    );
    let published = publisher
        .publish(NewInvoice {
            merchant: devnet_address(1),
            amount: if kind == InvoiceKind::Donation { 0 } else { args.amount },
            asset,
            kind,
            memo: Some("devnet demo".into()),
        })
        .await
        .context("publishing the demo invoice")?;
    tracing::info!(url = %published.url, "invoice published");

    // Seed the payer unless the conversion path was requested. The
    // wrapped-stable asset cannot be shielded, so it is always seeded.
    let effective = args.pay.unwrap_or(args.amount);
    if !args.empty_wallet || asset == AssetKind::WrappedStable {
        payer_wallet.mint_record(
            config.record_program_for(asset.requires_freeze_proof()),
            render_balance_record(&devnet_address(2), effective * 3 + 1, asset),
        );
    }

    // Payer pays.
    let mut flow = PaymentFlow::new(
        config,
        Arc::new(payer_wallet),
        Arc::new(ledger),
        Arc::new(index.clone()),
        cancel,
    );
    let outcome = flow
        .execute(&published.link, args.pay)
        .await
        .context("paying the demo invoice")?;

    let confirmed = outcome.confirmed_id.clone().unwrap_or_default();
    let secret = outcome.payment_secret.as_ref().map(field_to_literal);
    let receipt = outcome.receipt_commitment.as_ref().map(field_to_literal);

    if args.json {
        let report = serde_json::json!({
            "invoice": {
                "url": published.url,
                "commitment": field_to_literal(&published.invoice.commitment),
            },
            "outcome": {
                "step": outcome.step.to_string(),
                "confirmed_id": confirmed,
                "payment_secret": secret,
                "receipt_commitment": receipt,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("invoice:    {}", published.url);
        println!("outcome:    {}", outcome.step);
        println!("confirmed:  {confirmed}");
        if let Some(secret) = secret {
            println!("secret:     {secret}   (retain this to prove your payment)");
        }
        if let Some(receipt) = receipt {
            println!("receipt:    {receipt}");
        }
    }

    if outcome.step != PaymentStep::Success {
        bail!("demo did not reach the success state");
    }
    Ok(())
}

fn print_version() {
    println!(
        "veil {} (invoice program {})",
        env!("CARGO_PKG_VERSION"),
        veil_engine::config::INVOICE_PROGRAM,
    );
}
