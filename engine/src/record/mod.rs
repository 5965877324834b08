//! Private balance records: the typed plaintext parser and the
//! spend-record selector.
//!
//! A record is an owned, value-bearing unit consumable exactly once. The
//! wallet holds the ciphertexts and the keys; this module only ever works
//! on decrypted views and never touches nullifiers — uniqueness is the
//! ledger's job.

pub mod plaintext;
pub mod selector;

pub use plaintext::{
    render_balance_record, render_receipt_record, BalanceRecordData, InvoiceRecordData, KvBlock,
    PlaintextError, ReceiptRecordData, RecordData,
};
pub use selector::{RecordSelector, SelectedRecord, SelectionError};
