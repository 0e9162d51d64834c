//! Interface boundary to the two external systems the reconciler compares.
//!
//! - [`identity::IdentityProvider`]: the authoritative account list.
//! - [`documents::DocumentStore`]: the derived user / profile / call records,
//!   with paged range queries and all-or-nothing batch writes.
//!
//! Both traits are async and object safe so callers can hold
//! `Arc<dyn IdentityProvider>` and pick the backend at runtime: the REST
//! adapters in [`identity::toolkit_rest`] and [`documents::firestore_rest`], or
//! the in-memory stores in [`memory`] used by tests and rehearsal runs.
//!
//! Every remote failure surfaces as a [`errors::StoreError`] carrying an
//! [`errors::ErrorCode`]; callers decide retryability from the code alone.

pub mod config;
pub mod documents;
pub mod errors;
mod http;
pub mod identity;
pub mod memory;
pub mod models;

pub use errors::{ErrorCode, StoreError, StoreInitError};
