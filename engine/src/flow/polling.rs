//! # Confirmation Polling
//!
//! Both the conversion and the payment step wait on the same policy: poll
//! the wallet's status endpoint at a fixed cadence, bounded to a fixed
//! number of attempts. The policy is an explicit value, not a loop buried
//! in a flow method — tests shrink the interval, production uses the
//! config defaults, and the bound is observable either way.
//!
//! Outcome trichotomy (mirroring the wallet's status vocabulary):
//!
//! - `Confirmed` → return the final report;
//! - `Rejected` → fatal, immediately;
//! - bound exhausted → [`PaymentError::Timeout`], which is *not* a
//!   rejection and is presented to the user as retryable.
//!
//! Transient transport errors are swallowed and count as a used attempt.
//! The cancellation flag is checked before every status call and watched
//! during every sleep; after cancellation the loop makes no further
//! network calls and mutates nothing.

use tokio::sync::watch;
use tracing::debug;

use crate::client::wallet::{StatusReport, TransitionStatus, WalletConnector};
use crate::config::ProtocolConfig;
use crate::flow::error::PaymentError;

/// An explicit confirmation-polling policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Sleep between polls.
    pub interval: std::time::Duration,
    /// Total polls before timing out.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// The policy the config prescribes.
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.poll_max_attempts,
        }
    }
}

/// A finished poll: the terminal report plus how many polls it took.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The confirming status report.
    pub report: StatusReport,
    /// Polls used, including the confirming one.
    pub attempts: u32,
}

/// Poll `transient_id` until the wallet reports a terminal status, the
/// policy bound is exhausted, or the flow is cancelled.
pub async fn poll_until_final<W: WalletConnector + ?Sized>(
    wallet: &W,
    transient_id: &str,
    policy: &RetryPolicy,
    cancel: &mut watch::Receiver<bool>,
) -> Result<PollOutcome, PaymentError> {
    for attempt in 1..=policy.max_attempts {
        if *cancel.borrow() {
            return Err(PaymentError::Cancelled);
        }

        match wallet.transaction_status(transient_id).await {
            Ok(report) => match &report.status {
                TransitionStatus::Confirmed => {
                    return Ok(PollOutcome { report, attempts: attempt });
                }
                TransitionStatus::Rejected { reason } => {
                    return Err(PaymentError::Rejected {
                        reason: reason.clone(),
                    });
                }
                TransitionStatus::Pending => {}
            },
            Err(e) if e.is_transient() => {
                debug!(attempt, error = %e, "transient status-poll error, retrying");
            }
            Err(e) => return Err(e.into()),
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return Err(PaymentError::Cancelled);
                    }
                }
            }
        }
    }

    Err(PaymentError::Timeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryWallet;
    use crate::client::wallet::TransitionRequest;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 120,
        }
    }

    fn request() -> TransitionRequest {
        TransitionRequest {
            program: "veil_invoices_v2".into(),
            function: "settle_invoice".into(),
            inputs: vec![],
            fee_grains: 0,
        }
    }

    #[tokio::test]
    async fn confirmed_on_first_poll() {
        let wallet = InMemoryWallet::connected("veil1w");
        let id = wallet.submit_transition(request()).await.unwrap();
        let (_tx, mut cancel) = watch::channel(false);

        let outcome = poll_until_final(&wallet, &id, &fast_policy(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.report.status, TransitionStatus::Confirmed);
    }

    #[tokio::test]
    async fn never_resolving_stream_times_out_after_exactly_120_polls() {
        let wallet = InMemoryWallet::connected("veil1w");
        wallet.hold_all_transitions_pending();
        let id = wallet.submit_transition(request()).await.unwrap();
        let (_tx, mut cancel) = watch::channel(false);

        let err = poll_until_final(&wallet, &id, &fast_policy(), &mut cancel)
            .await
            .unwrap_err();
        // A timeout, not a rejection. The two must stay distinguishable.
        assert!(matches!(err, PaymentError::Timeout { attempts: 120 }));
        assert_eq!(wallet.status_polls_for(&id), 120);
    }

    #[tokio::test]
    async fn rejection_is_fatal_and_immediate() {
        let wallet = InMemoryWallet::connected("veil1w");
        wallet.reject_next_transition("balance check failed");
        let id = wallet.submit_transition(request()).await.unwrap();
        let (_tx, mut cancel) = watch::channel(false);

        let err = poll_until_final(&wallet, &id, &fast_policy(), &mut cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Rejected { .. }));
        assert_eq!(wallet.status_polls_for(&id), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_swallowed() {
        let wallet = InMemoryWallet::connected("veil1w");
        wallet.fail_next_status_polls(3);
        let id = wallet.submit_transition(request()).await.unwrap();
        let (_tx, mut cancel) = watch::channel(false);

        let outcome = poll_until_final(&wallet, &id, &fast_policy(), &mut cancel)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test]
    async fn cancellation_stops_polling_without_timeout() {
        let wallet = InMemoryWallet::connected("veil1w");
        wallet.hold_all_transitions_pending();
        let id = wallet.submit_transition(request()).await.unwrap();
        let (tx, mut cancel) = watch::channel(false);

        let policy = RetryPolicy {
            interval: Duration::from_millis(50),
            max_attempts: 120,
        };
        let handle = {
            let wallet = wallet.clone();
            tokio::spawn(async move {
                poll_until_final(&wallet, &id, &policy, &mut cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PaymentError::Cancelled));
    }
}
