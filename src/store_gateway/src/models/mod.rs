//! Vendor-agnostic records exchanged with the two stores.

pub mod document;
pub mod identity;
pub mod write;

pub use document::{
    Document, DocumentPage, FieldFilter, Fields, QueryRequest, as_timestamp, timestamp_value,
};
pub use identity::{AccountPage, IdentityRecord};
pub use write::WriteOp;
