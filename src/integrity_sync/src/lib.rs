//! Dual-source integrity reconciler.
//!
//! Compares the identity provider's accounts with the document store's user,
//! provider-profile and call records, reports every inconsistency as an
//! [`findings::Issue`], and proposes a typed [`fix::Fix`] for each one it knows
//! how to repair. Fixes are applied only on request, highest priority first,
//! in bounded atomic batches.
//!
//! Entry point: [`orchestrator::Reconciler`].

#![warn(missing_docs)]

pub mod checks;
pub mod config;
pub mod error;
pub mod fetch;
pub mod findings;
pub mod fix;
pub mod metrics;
pub mod orchestrator;
pub mod records;
pub mod retry;
pub mod validate;

pub use error::ReconcileError;
