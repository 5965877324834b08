//! # CLI Interface
//!
//! Defines the command-line argument structure for `veil` using `clap`
//! derive. Supports four subcommands: `new`, `link`, `demo`, and
//! `version`.

use clap::{Parser, Subcommand};

/// VEIL invoicing protocol companion.
///
/// Generates invoice links, decodes and re-verifies existing ones, and
/// runs full payment lifecycles against the in-process devnet simulator.
#[derive(Parser, Debug)]
#[command(
    name = "veil",
    about = "VEIL invoicing protocol companion",
    version,
    propagate_version = true
)]
pub struct VeilCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `veil` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a fresh invoice: salt, commitment, and shareable link.
    /// Offline — the invoice becomes payable once its commitment is
    /// published on-chain.
    New(NewArgs),
    /// Decode an invoice link and recompute its commitment.
    Link(LinkArgs),
    /// Run a publish → pay lifecycle on the in-process devnet.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `new` subcommand.
#[derive(Parser, Debug)]
pub struct NewArgs {
    /// Merchant address (`veil1…`) the payments will go to.
    #[arg(long, short = 'm')]
    pub merchant: String,

    /// Requested amount in grains. Zero (with --kind donation) makes an
    /// open-ended link.
    #[arg(long, short = 'a', default_value_t = 0)]
    pub amount: u64,

    /// Asset to denominate in: primary or wusd.
    #[arg(long, default_value = "primary")]
    pub token: String,

    /// Invoice kind: standard, multi, or donation.
    #[arg(long, default_value = "standard")]
    pub kind: String,

    /// Free-text memo carried in the link.
    #[arg(long)]
    pub memo: Option<String>,
}

/// Arguments for the `link` subcommand.
#[derive(Parser, Debug)]
pub struct LinkArgs {
    /// The invoice link URL to decode.
    pub url: String,
}

/// Arguments for the `demo` subcommand.
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Invoice amount in grains.
    #[arg(long, short = 'a', default_value_t = 1_000_000)]
    pub amount: u64,

    /// Asset to denominate in: primary or wusd.
    #[arg(long, default_value = "primary")]
    pub token: String,

    /// Invoice kind: standard, multi, or donation.
    #[arg(long, default_value = "standard")]
    pub kind: String,

    /// Amount the payer contributes (required for donation demos).
    #[arg(long)]
    pub pay: Option<u64>,

    /// Start the payer with no private records, forcing the
    /// public-to-private conversion path.
    #[arg(long, default_value_t = false)]
    pub empty_wallet: bool,

    /// Emit machine-readable JSON instead of human-readable lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
