//! Invoice data model: kinds, status, on-chain state, and the link codec.

pub mod link;
pub mod types;

pub use link::{InvoiceLink, LinkError, DEFAULT_LINK_BASE};
pub use types::{
    validate_address, AssetKind, Invoice, InvoiceKind, InvoiceStateError, InvoiceStatus,
    OnChainInvoiceState,
};
