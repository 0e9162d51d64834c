//! Identity Toolkit REST adapter (`accounts:batchGet`).

pub mod provider;
mod response;

pub use provider::ToolkitIdentityProvider;
