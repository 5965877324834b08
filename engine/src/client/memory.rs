//! # In-Memory Devnet Collaborators
//!
//! In-process implementations of all three collaborator traits, wired to
//! a shared mapping store so that submitted transitions actually execute:
//! shielding mints a record, publishing writes the commitment mappings,
//! settling spends the record and flips the invoice state. This is the
//! backend behind `veil demo` and the test double for every flow test.
//!
//! The devnet speaks the *default* protocol wiring
//! ([`crate::config::ProtocolConfig::default`]) — function names are
//! matched against the module constants, not a caller-supplied config.
//!
//! Failure injection covers the cases the flow must survive: scripted
//! rejections, transitions that never confirm, flaky status transport,
//! denied history capability, and an index that refuses writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::client::index::{IndexError, InvoiceIndex, InvoiceMetadata, SettlementUpdate};
use crate::client::ledger::{ExecutionTrace, LedgerError, LedgerQuery, TransitionTrace};
use crate::client::wallet::{
    StatusReport, TransitionRequest, TransitionStatus, WalletConnector, WalletError, WalletRecord,
};
use crate::config::{
    INVOICE_PROGRAM, INVOICE_STATE_MAPPING, COMMITMENT_MAPPING, PUBLISH_FUNCTION,
    SETTLE_FUNCTION, SETTLE_STABLE_FUNCTION, SHIELD_FUNCTION, STABLE_PROGRAM,
};
use crate::crypto::derive_receipt_commitment;
use crate::crypto::hash::field_from_literal;
use crate::invoice::types::{AssetKind, InvoiceStatus, OnChainInvoiceState};
use crate::record::plaintext::{render_balance_record, render_receipt_record, RecordData};

/// Deterministic `veil1…` address for demos and tests.
pub fn devnet_address(seed: u8) -> String {
    let hrp = bech32::Hrp::parse(crate::config::ADDRESS_HRP).expect("static HRP is valid");
    bech32::encode::<bech32::Bech32>(hrp, &[seed; 32]).expect("32-byte payload always encodes")
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    /// (program, mapping, key) → value.
    mappings: HashMap<(String, String, String), String>,
    /// tx id (transient or confirmed) → trace.
    traces: HashMap<String, ExecutionTrace>,
}

/// Shared in-process ledger state.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// Fresh, fully empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a mapping value directly (test and devnet setup).
    pub fn set_mapping(&self, program: &str, mapping: &str, key: &str, value: &str) {
        self.state.lock().mappings.insert(
            (program.to_string(), mapping.to_string(), key.to_string()),
            value.to_string(),
        );
    }

    /// Synchronous mapping read for in-process execution paths.
    pub fn get_mapping(&self, program: &str, mapping: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .mappings
            .get(&(program.to_string(), mapping.to_string(), key.to_string()))
            .cloned()
    }

    /// Store an execution trace under a transaction id.
    pub fn insert_trace(&self, tx_id: &str, trace: ExecutionTrace) {
        self.state.lock().traces.insert(tx_id.to_string(), trace);
    }

    /// Drop all stored traces. Used to simulate an explorer that never
    /// indexed a transaction.
    pub fn clear_traces(&self) {
        self.state.lock().traces.clear();
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn mapping_value(
        &self,
        program: &str,
        mapping: &str,
        key: &str,
    ) -> Result<Option<String>, LedgerError> {
        Ok(self
            .state
            .lock()
            .mappings
            .get(&(program.to_string(), mapping.to_string(), key.to_string()))
            .cloned())
    }

    async fn transaction_trace(&self, tx_id: &str) -> Result<Option<ExecutionTrace>, LedgerError> {
        Ok(self.state.lock().traces.get(tx_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// InMemoryWallet
// ---------------------------------------------------------------------------

struct StoredRecord {
    plaintext: String,
    /// When set, the listing withholds the plaintext and the engine must
    /// go through `decrypt_record`.
    ciphertext_only: bool,
    spent: bool,
}

struct PendingTransition {
    /// Submission order, for deterministic listings.
    seq: u64,
    request: TransitionRequest,
    confirmed_id: String,
    outputs: Vec<String>,
    rejected: Option<String>,
    /// Never report a terminal status.
    held: bool,
    status_polls: u32,
}

#[derive(Default)]
struct WalletState {
    identity: Option<String>,
    /// program → records.
    records: HashMap<String, Vec<StoredRecord>>,
    /// Records queued to appear after the next listing, simulating a
    /// sync loop that is one beat behind.
    late_records: Vec<(String, String)>,
    listing_seen: bool,
    next_seq: u64,
    transitions: HashMap<String, PendingTransition>,
    reject_next: Option<String>,
    hold_all: bool,
    failing_status_polls: u32,
    inline_outputs: bool,
    history_denial: Option<HistoryDenial>,
    publish_traces: bool,
}

/// How the wallet refuses history reads, when told to.
#[derive(Clone, Copy, Debug)]
pub enum HistoryDenial {
    /// The user has not granted the history permission.
    PermissionDenied,
    /// The wallet session dropped.
    Disconnected,
    /// The wallet does not implement history at all.
    CapabilityUnavailable,
}

impl HistoryDenial {
    fn to_error(self) -> WalletError {
        match self {
            Self::PermissionDenied => WalletError::PermissionDenied("transaction history".into()),
            Self::Disconnected => WalletError::Disconnected,
            Self::CapabilityUnavailable => {
                WalletError::CapabilityUnavailable("transaction history".into())
            }
        }
    }
}

/// An in-process wallet that executes transitions against an
/// [`InMemoryLedger`].
#[derive(Clone)]
pub struct InMemoryWallet {
    state: Arc<Mutex<WalletState>>,
    ledger: InMemoryLedger,
}

impl InMemoryWallet {
    /// A wallet already connected as `address`, with its own private
    /// ledger (sufficient for record and polling tests).
    pub fn connected(address: &str) -> Self {
        Self::with_ledger(address, InMemoryLedger::new())
    }

    /// A connected wallet executing against a shared ledger.
    pub fn with_ledger(address: &str, ledger: InMemoryLedger) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalletState {
                identity: Some(address.to_string()),
                inline_outputs: true,
                publish_traces: true,
                ..WalletState::default()
            })),
            ledger,
        }
    }

    /// A wallet whose user has not approved the connection yet.
    pub fn awaiting_connection(ledger: InMemoryLedger) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalletState {
                inline_outputs: true,
                publish_traces: true,
                ..WalletState::default()
            })),
            ledger,
        }
    }

    /// Complete the connection handshake.
    pub fn set_identity(&self, address: &str) {
        self.state.lock().identity = Some(address.to_string());
    }

    /// Mint a decrypted record under a program.
    pub fn mint_record(&self, program: &str, plaintext: String) {
        self.state
            .lock()
            .records
            .entry(program.to_string())
            .or_default()
            .push(StoredRecord {
                plaintext,
                ciphertext_only: false,
                spent: false,
            });
    }

    /// Mint a record the listing only exposes as ciphertext.
    pub fn mint_ciphertext_record(&self, program: &str, plaintext: String) {
        self.state
            .lock()
            .records
            .entry(program.to_string())
            .or_default()
            .push(StoredRecord {
                plaintext,
                ciphertext_only: true,
                spent: false,
            });
    }

    /// Queue a record that materializes only after the next listing.
    pub fn mint_record_after_next_listing(&self, program: &str, plaintext: String) {
        self.state
            .lock()
            .late_records
            .push((program.to_string(), plaintext));
    }

    /// Mark every record under a program as spent.
    pub fn mark_all_spent(&self, program: &str) {
        if let Some(records) = self.state.lock().records.get_mut(program) {
            for record in records.iter_mut() {
                record.spent = true;
            }
        }
    }

    /// Reject the next submitted transition with the given reason.
    pub fn reject_next_transition(&self, reason: &str) {
        self.state.lock().reject_next = Some(reason.to_string());
    }

    /// Keep every transition pending forever (timeout scenarios).
    pub fn hold_all_transitions_pending(&self) {
        self.state.lock().hold_all = true;
    }

    /// Fail the next `n` status polls with a transport error.
    pub fn fail_next_status_polls(&self, n: u32) {
        self.state.lock().failing_status_polls = n;
    }

    /// Stop surfacing execution outputs in status reports, forcing the
    /// resolver chain past strategy one.
    pub fn suppress_inline_outputs(&self) {
        self.state.lock().inline_outputs = false;
    }

    /// Deny the transaction-history capability in the given way.
    pub fn deny_history(&self, denial: HistoryDenial) {
        self.state.lock().history_denial = Some(denial);
    }

    /// Stop publishing execution traces to the ledger, simulating an
    /// explorer that never indexes the transaction.
    pub fn skip_trace_publication(&self) {
        self.state.lock().publish_traces = false;
    }

    /// Status polls observed for a transition id.
    pub fn status_polls_for(&self, transient_id: &str) -> u32 {
        self.state
            .lock()
            .transitions
            .get(transient_id)
            .map(|t| t.status_polls)
            .unwrap_or(0)
    }

    /// Every request submitted so far, in order of submission.
    pub fn submitted_requests(&self) -> Vec<TransitionRequest> {
        let state = self.state.lock();
        let mut all: Vec<_> = state.transitions.values().collect();
        all.sort_by_key(|t| t.seq);
        all.iter().map(|t| t.request.clone()).collect()
    }

    /// Execute a transition's ledger effects and produce its outputs.
    /// Runs at submission; the effects become observable to the engine
    /// when the status flips to confirmed, which on the devnet is the
    /// first unheld poll.
    fn execute(&self, request: &TransitionRequest) -> Vec<String> {
        match request.function.as_str() {
            PUBLISH_FUNCTION => self.execute_publish(request),
            SETTLE_FUNCTION | SETTLE_STABLE_FUNCTION => self.execute_settle(request),
            SHIELD_FUNCTION => self.execute_shield(request),
            _ => Vec::new(),
        }
    }

    /// publish_invoice(merchant, amount, salt, commitment, asset, kind)
    fn execute_publish(&self, request: &TransitionRequest) -> Vec<String> {
        let inputs = &request.inputs;
        if inputs.len() < 6 {
            return Vec::new();
        }
        let (salt, commitment) = (&inputs[2], &inputs[3]);
        let settled = false;
        self.ledger
            .set_mapping(INVOICE_PROGRAM, COMMITMENT_MAPPING, salt, commitment);
        self.ledger.set_mapping(
            INVOICE_PROGRAM,
            INVOICE_STATE_MAPPING,
            commitment,
            &format!(
                "{{ settled: {settled}, asset: {}, kind: {} }}",
                inputs[4], inputs[5]
            ),
        );
        vec![commitment.clone()]
    }

    /// settle_invoice(record, merchant, amount, salt, secret[, proof, proof])
    fn execute_settle(&self, request: &TransitionRequest) -> Vec<String> {
        let inputs = &request.inputs;
        if inputs.len() < 5 {
            return Vec::new();
        }
        if request.function == SETTLE_STABLE_FUNCTION && inputs.len() < 7 {
            // The stable path without its freeze-proof pair would be
            // rejected by the real program; mirror that as no effects.
            return Vec::new();
        }
        let record_plaintext = &inputs[0];
        let amount: u64 = inputs[2]
            .strip_suffix("u64")
            .and_then(|d| d.parse().ok())
            .unwrap_or(0);
        let salt_literal = &inputs[3];

        // Spend the consumed record and mint change.
        let program = if request.function == SETTLE_STABLE_FUNCTION {
            STABLE_PROGRAM
        } else {
            INVOICE_PROGRAM
        };
        let mut change: Option<String> = None;
        {
            let mut state = self.state.lock();
            let owner = state.identity.clone().unwrap_or_default();
            if let Some(records) = state.records.get_mut(program) {
                if let Some(consumed) = records
                    .iter_mut()
                    .find(|r| !r.spent && &r.plaintext == record_plaintext)
                {
                    consumed.spent = true;
                    if let Ok(RecordData::Balance(data)) = RecordData::parse(record_plaintext) {
                        if data.amount > amount {
                            change = Some(render_balance_record(
                                &owner,
                                data.amount - amount,
                                data.asset,
                            ));
                        }
                    }
                }
            }
            if let Some(plaintext) = change {
                state
                    .records
                    .entry(program.to_string())
                    .or_default()
                    .push(StoredRecord {
                        plaintext,
                        ciphertext_only: false,
                        spent: false,
                    });
            }
        }

        // Flip the invoice state unless the kind is repeat-payable.
        let Some(commitment) =
            self.ledger
                .get_mapping(INVOICE_PROGRAM, COMMITMENT_MAPPING, salt_literal)
        else {
            return Vec::new();
        };
        if let Some(state_text) =
            self.ledger
                .get_mapping(INVOICE_PROGRAM, INVOICE_STATE_MAPPING, &commitment)
        {
            if let Ok(mut state) = OnChainInvoiceState::parse(&state_text) {
                if !state.kind.allows_repeat_payment() {
                    state.status = InvoiceStatus::Settled;
                }
                self.ledger.set_mapping(
                    INVOICE_PROGRAM,
                    INVOICE_STATE_MAPPING,
                    &commitment,
                    &state.render(),
                );
            }
        }

        // Mint the payer-side receipt record, mirroring the program's
        // dual-receipt output. Both sides carry the same commitment.
        let receipt_outputs = match (
            field_from_literal(&inputs[4]),
            field_from_literal(salt_literal),
        ) {
            (Ok(secret), Ok(salt)) => {
                let receipt = derive_receipt_commitment(&secret, &salt);
                let owner = self.state.lock().identity.clone().unwrap_or_default();
                let payer_receipt = render_receipt_record(&owner, &receipt, amount, true);
                let merchant_receipt = render_receipt_record(&inputs[1], &receipt, amount, false);
                self.state
                    .lock()
                    .records
                    .entry(INVOICE_PROGRAM.to_string())
                    .or_default()
                    .push(StoredRecord {
                        plaintext: payer_receipt.clone(),
                        ciphertext_only: false,
                        spent: false,
                    });
                vec![payer_receipt, merchant_receipt]
            }
            _ => Vec::new(),
        };

        let mut outputs = vec![commitment];
        outputs.extend(receipt_outputs);
        outputs
    }

    /// shield(amount) — mint a fresh private record from public balance.
    fn execute_shield(&self, request: &TransitionRequest) -> Vec<String> {
        let Some(amount) = request
            .inputs
            .first()
            .and_then(|i| i.strip_suffix("u64"))
            .and_then(|d| d.parse::<u64>().ok())
        else {
            return Vec::new();
        };
        let mut state = self.state.lock();
        let owner = state.identity.clone().unwrap_or_default();
        let plaintext = render_balance_record(&owner, amount, AssetKind::Primary);
        state
            .records
            .entry(INVOICE_PROGRAM.to_string())
            .or_default()
            .push(StoredRecord {
                plaintext: plaintext.clone(),
                ciphertext_only: false,
                spent: false,
            });
        vec![plaintext]
    }
}

#[async_trait]
impl WalletConnector for InMemoryWallet {
    async fn identity(&self) -> Result<Option<String>, WalletError> {
        Ok(self.state.lock().identity.clone())
    }

    async fn submit_transition(&self, request: TransitionRequest) -> Result<String, WalletError> {
        let transient_id = format!("txn_{}", Uuid::new_v4().simple());
        let confirmed_id = format!("at_{}", Uuid::new_v4().simple());

        let rejected = self.state.lock().reject_next.take();
        let outputs = if rejected.is_none() {
            self.execute(&request)
        } else {
            Vec::new()
        };

        let mut state = self.state.lock();
        if rejected.is_none() && state.publish_traces {
            let trace = ExecutionTrace {
                confirmed_id: Some(confirmed_id.clone()),
                transitions: vec![TransitionTrace {
                    function: request.function.clone(),
                    outputs: outputs.clone(),
                }],
            };
            self.ledger.insert_trace(&transient_id, trace.clone());
            self.ledger.insert_trace(&confirmed_id, trace);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let held = state.hold_all;
        state.transitions.insert(
            transient_id.clone(),
            PendingTransition {
                seq,
                request,
                confirmed_id,
                outputs,
                rejected,
                held,
                status_polls: 0,
            },
        );
        Ok(transient_id)
    }

    async fn transaction_status(&self, transient_id: &str) -> Result<StatusReport, WalletError> {
        let mut state = self.state.lock();
        if state.failing_status_polls > 0 {
            state.failing_status_polls -= 1;
            return Err(WalletError::Transport("status endpoint unavailable".into()));
        }
        let inline = state.inline_outputs;
        let Some(transition) = state.transitions.get_mut(transient_id) else {
            return Err(WalletError::Transport(format!(
                "unknown transaction {transient_id}"
            )));
        };
        transition.status_polls += 1;

        if let Some(reason) = &transition.rejected {
            return Ok(StatusReport {
                status: TransitionStatus::Rejected {
                    reason: reason.clone(),
                },
                confirmed_id: None,
                outputs: Vec::new(),
            });
        }
        if transition.held {
            return Ok(StatusReport {
                status: TransitionStatus::Pending,
                confirmed_id: None,
                outputs: Vec::new(),
            });
        }
        Ok(StatusReport {
            status: TransitionStatus::Confirmed,
            confirmed_id: Some(transition.confirmed_id.clone()),
            outputs: if inline {
                transition.outputs.clone()
            } else {
                Vec::new()
            },
        })
    }

    async fn records(&self, program: &str) -> Result<Vec<WalletRecord>, WalletError> {
        let mut state = self.state.lock();
        if state.listing_seen && !state.late_records.is_empty() {
            let late = std::mem::take(&mut state.late_records);
            for (late_program, plaintext) in late {
                state
                    .records
                    .entry(late_program)
                    .or_default()
                    .push(StoredRecord {
                        plaintext,
                        ciphertext_only: false,
                        spent: false,
                    });
            }
        }
        state.listing_seen = true;

        Ok(state
            .records
            .get(program)
            .map(|records| {
                records
                    .iter()
                    .map(|r| WalletRecord {
                        ciphertext: format!("cipher:{}", hex::encode(&r.plaintext)),
                        plaintext: (!r.ciphertext_only).then(|| r.plaintext.clone()),
                        spent: r.spent,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn decrypt_record(&self, ciphertext: &str) -> Result<String, WalletError> {
        let hex_body = ciphertext
            .strip_prefix("cipher:")
            .ok_or_else(|| WalletError::Transport("malformed ciphertext".into()))?;
        let bytes = hex::decode(hex_body)
            .map_err(|e| WalletError::Transport(format!("ciphertext decode: {e}")))?;
        String::from_utf8(bytes).map_err(|e| WalletError::Transport(format!("plaintext utf8: {e}")))
    }

    async fn transaction_history(
        &self,
        transient_id: &str,
    ) -> Result<Option<ExecutionTrace>, WalletError> {
        if let Some(denial) = self.state.lock().history_denial {
            return Err(denial.to_error());
        }
        self.ledger
            .transaction_trace(transient_id)
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// InMemoryIndex
// ---------------------------------------------------------------------------

#[derive(Default)]
struct IndexState {
    entries: HashMap<String, InvoiceMetadata>,
    fail_writes: bool,
}

/// In-process invoice index.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    state: Arc<Mutex<IndexState>>,
}

impl InMemoryIndex {
    /// Fresh empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail. The flow must log and carry on.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Direct synchronous read for test assertions.
    pub fn entry(&self, commitment: &str) -> Option<InvoiceMetadata> {
        self.state.lock().entries.get(commitment).cloned()
    }
}

#[async_trait]
impl InvoiceIndex for InMemoryIndex {
    async fn fetch(&self, commitment: &str) -> Result<Option<InvoiceMetadata>, IndexError> {
        Ok(self.state.lock().entries.get(commitment).cloned())
    }

    async fn register(&self, metadata: InvoiceMetadata) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(IndexError::Request("index unavailable".into()));
        }
        state.entries.insert(metadata.commitment.clone(), metadata);
        Ok(())
    }

    async fn record_settlement(
        &self,
        commitment: &str,
        update: SettlementUpdate,
    ) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(IndexError::Request("index unavailable".into()));
        }
        let now = Utc::now();
        let entry = state
            .entries
            .entry(commitment.to_string())
            .or_insert_with(|| InvoiceMetadata {
                commitment: commitment.to_string(),
                merchant_cipher: None,
                amount: 0,
                asset: AssetKind::Primary.wire_token().to_string(),
                kind: "standard".to_string(),
                settled: false,
                payment_transactions: Vec::new(),
                payer: None,
                memo: None,
                created_at: now,
                updated_at: now,
            });
        entry.settled = update.settled;
        entry.payment_transactions.push(update.payment_transaction);
        entry.payer = update.payer.or(entry.payer.take());
        entry.updated_at = now;
        Ok(())
    }
}
