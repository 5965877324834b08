//! # Spend-Record Selection
//!
//! Given the wallet's record set and a required amount, pick one private
//! balance record to consume. Policy is first-fit over records whose value
//! *strictly* exceeds the requirement — the transfer primitive must emit a
//! nonzero change record, so an exact-value match is unusable and is
//! skipped, not selected.
//!
//! First-fit rather than best-fit is deliberate: record values are private,
//! nothing observable leaks either way, and first-fit avoids pretending
//! there is an optimization worth making here.
//!
//! Selection runs up to three passes:
//!
//! 1. Records the wallet already decrypted.
//! 2. Opportunistic decryption of the remaining ciphertexts (per-record
//!    denials are skipped, not fatal).
//! 3. One re-sync retry against a refreshed record set after a short
//!    delay, for the case where the wallet's sync loop is a beat behind.
//!
//! Only then does the selector give a verdict, and the verdict
//! distinguishes *fragmentation* (the funds exist but no single record
//! covers the amount — consolidation would fix it) from plain
//! *insufficiency* (the funds do not exist; conversion might fix it).
//! The lifecycle controller routes the two differently.

use tracing::debug;

use crate::client::wallet::{WalletConnector, WalletError, WalletRecord};
use crate::config::ProtocolConfig;
use crate::invoice::types::AssetKind;
use crate::record::plaintext::{BalanceRecordData, RecordData};

/// A record chosen for spending, with the plaintext the settle
/// transition consumes.
#[derive(Debug, Clone)]
pub struct SelectedRecord {
    /// The decrypted record plaintext, passed verbatim as a transition
    /// input.
    pub plaintext: String,
    /// Parsed view of the same record.
    pub data: BalanceRecordData,
}

/// Why no record could be selected.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// Total unspent value covers the amount, but no single record does.
    /// Consolidating records would make the payment possible.
    #[error(
        "balance is fragmented: {total} total across records, but no single record exceeds {required} \
         (an exact-value record cannot be spent — the transfer must leave nonzero change)"
    )]
    Fragmented {
        /// The required amount.
        required: u64,
        /// Total unspent value in the matching asset.
        total: u64,
    },

    /// Total unspent value does not cover the amount.
    #[error("insufficient balance: {total} available, {required} required")]
    Insufficient {
        /// The required amount.
        required: u64,
        /// Total unspent value in the matching asset.
        total: u64,
    },

    /// The wallet became unusable mid-selection.
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// One scan over a record set: the first-fit pick (if any) and the total
/// unspent value seen in the matching asset.
struct ScanOutcome {
    selected: Option<SelectedRecord>,
    total: u64,
}

/// Selects a spendable record for a payment.
pub struct RecordSelector<'a, W: WalletConnector> {
    wallet: &'a W,
    config: &'a ProtocolConfig,
}

impl<'a, W: WalletConnector> RecordSelector<'a, W> {
    /// Create a selector over the given wallet.
    pub fn new(wallet: &'a W, config: &'a ProtocolConfig) -> Self {
        Self { wallet, config }
    }

    /// Pick a record under `program` in `asset` whose value strictly
    /// exceeds `amount`.
    pub async fn select(
        &self,
        program: &str,
        asset: AssetKind,
        amount: u64,
    ) -> Result<SelectedRecord, SelectionError> {
        let records = self.wallet.records(program).await?;
        let first = self.scan(records, asset, amount).await?;
        if let Some(selected) = first.selected {
            return Ok(selected);
        }

        // One bounded retry against a refreshed set. Records spent or
        // received since the first listing show up here; anything slower
        // is the wallet sync loop's problem, not ours.
        debug!(
            required = amount,
            seen_total = first.total,
            "no spendable record on first scan, retrying after re-sync delay"
        );
        tokio::time::sleep(self.config.record_resync_delay).await;

        let records = self.wallet.records(program).await?;
        let second = self.scan(records, asset, amount).await?;
        if let Some(selected) = second.selected {
            return Ok(selected);
        }

        if second.total >= amount {
            Err(SelectionError::Fragmented {
                required: amount,
                total: second.total,
            })
        } else {
            Err(SelectionError::Insufficient {
                required: amount,
                total: second.total,
            })
        }
    }

    /// Scan a record set: plaintext pass first, then opportunistic
    /// decryption of the remainder. Tracks the unspent matching-asset
    /// total for the final verdict.
    async fn scan(
        &self,
        records: Vec<WalletRecord>,
        asset: AssetKind,
        amount: u64,
    ) -> Result<ScanOutcome, SelectionError> {
        let mut total: u64 = 0;
        let mut selected: Option<SelectedRecord> = None;
        let mut pending_ciphertexts: Vec<WalletRecord> = Vec::new();

        for record in records {
            if record.spent {
                continue;
            }
            match &record.plaintext {
                Some(plaintext) => {
                    if let Some(data) = parse_balance(plaintext, asset) {
                        total = total.saturating_add(data.amount);
                        if selected.is_none() && data.amount > amount {
                            selected = Some(SelectedRecord {
                                plaintext: plaintext.clone(),
                                data,
                            });
                        }
                    }
                }
                None => pending_ciphertexts.push(record),
            }
        }

        if selected.is_some() {
            return Ok(ScanOutcome { selected, total });
        }

        for record in pending_ciphertexts {
            let plaintext = match self.wallet.decrypt_record(&record.ciphertext).await {
                Ok(plaintext) => plaintext,
                // Per-record denials just shrink the candidate set; a
                // dead wallet session ends selection entirely.
                Err(WalletError::Disconnected) => return Err(WalletError::Disconnected.into()),
                Err(e) => {
                    debug!(error = %e, "skipping undecryptable record");
                    continue;
                }
            };
            if let Some(data) = parse_balance(&plaintext, asset) {
                total = total.saturating_add(data.amount);
                if selected.is_none() && data.amount > amount {
                    selected = Some(SelectedRecord { plaintext, data });
                }
            }
        }

        Ok(ScanOutcome { selected, total })
    }
}

/// Parse a plaintext as a balance record in the wanted asset. Anything
/// else — receipts, invoices, unknown shapes, parse failures — is not a
/// candidate and is logged at debug, never guessed at.
fn parse_balance(plaintext: &str, asset: AssetKind) -> Option<BalanceRecordData> {
    match RecordData::parse(plaintext) {
        Ok(RecordData::Balance(data)) if data.asset == asset => Some(data),
        Ok(RecordData::Balance(_)) => None,
        Ok(other) => {
            debug!(record = ?other, "non-balance record among spend candidates");
            None
        }
        Err(e) => {
            debug!(error = %e, "unparseable record plaintext among spend candidates");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryWallet;
    use crate::record::plaintext::render_balance_record;

    fn cfg() -> ProtocolConfig {
        ProtocolConfig::devnet()
    }

    fn wallet_with(amounts: &[u64]) -> InMemoryWallet {
        let wallet = InMemoryWallet::connected("veil1payerwallet");
        for &amount in amounts {
            wallet.mint_record(
                crate::config::INVOICE_PROGRAM,
                render_balance_record("veil1payerwallet", amount, AssetKind::Primary),
            );
        }
        wallet
    }

    #[tokio::test]
    async fn first_fit_picks_first_strictly_larger() {
        let wallet = wallet_with(&[400_000, 1_200_000, 3_000_000]);
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let selected = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap();
        assert_eq!(selected.data.amount, 1_200_000);
    }

    #[tokio::test]
    async fn exact_value_record_is_rejected() {
        // 1_000_000 == amount must not be chosen: the transfer needs a
        // nonzero change output. The 2_500_000 record is the only pick.
        let wallet = wallet_with(&[1_000_000, 2_500_000]);
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let selected = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap();
        assert_eq!(selected.data.amount, 2_500_000);
    }

    #[tokio::test]
    async fn sum_below_amount_is_insufficient() {
        let wallet = wallet_with(&[500_000, 900_000]);
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let err = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 2_000_000)
            .await
            .unwrap_err();
        match err {
            SelectionError::Insufficient { required, total } => {
                assert_eq!(required, 2_000_000);
                assert_eq!(total, 1_400_000);
            }
            other => panic!("expected insufficiency, got {other}"),
        }
    }

    #[tokio::test]
    async fn sum_covering_amount_is_fragmentation_not_insufficiency() {
        let wallet = wallet_with(&[1_000_000, 1_500_000]);
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let err = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 2_000_000)
            .await
            .unwrap_err();
        match err {
            SelectionError::Fragmented { required, total } => {
                assert_eq!(required, 2_000_000);
                assert_eq!(total, 2_500_000);
            }
            other => panic!("expected fragmentation, got {other}"),
        }
    }

    #[tokio::test]
    async fn spent_records_are_not_candidates() {
        let wallet = wallet_with(&[2_000_000]);
        wallet.mark_all_spent(crate::config::INVOICE_PROGRAM);
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let err = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::Insufficient { total: 0, .. }));
    }

    #[tokio::test]
    async fn ciphertext_records_are_decrypted_on_demand() {
        let wallet = InMemoryWallet::connected("veil1payerwallet");
        wallet.mint_ciphertext_record(
            crate::config::INVOICE_PROGRAM,
            render_balance_record("veil1payerwallet", 5_000_000, AssetKind::Primary),
        );
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let selected = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap();
        assert_eq!(selected.data.amount, 5_000_000);
    }

    #[tokio::test]
    async fn wrong_asset_records_are_ignored() {
        let wallet = InMemoryWallet::connected("veil1payerwallet");
        wallet.mint_record(
            crate::config::INVOICE_PROGRAM,
            render_balance_record("veil1payerwallet", 9_000_000, AssetKind::WrappedStable),
        );
        let config = cfg();
        let selector = RecordSelector::new(&wallet, &config);

        let err = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::Insufficient { total: 0, .. }));
    }

    #[tokio::test]
    async fn resync_retry_sees_late_records() {
        // Empty on the first listing; a record arrives while the
        // selector waits out the re-sync delay.
        let wallet = wallet_with(&[]);
        let config = cfg();

        wallet.mint_record_after_next_listing(
            crate::config::INVOICE_PROGRAM,
            render_balance_record("veil1payerwallet", 2_000_000, AssetKind::Primary),
        );

        let selector = RecordSelector::new(&wallet, &config);
        let selected = selector
            .select(crate::config::INVOICE_PROGRAM, AssetKind::Primary, 1_000_000)
            .await
            .unwrap();
        assert_eq!(selected.data.amount, 2_000_000);
    }
}
