//! Document store abstraction.
//!
//! The document store holds the derived records (users, provider profiles,
//! calls). The reconciler reads whole collections through cursor-based range
//! queries and repairs them through atomic batches.

pub mod firestore_rest;

use async_trait::async_trait;

use crate::{
    errors::StoreError,
    models::{DocumentPage, QueryRequest, WriteOp},
};

/// Paged reads plus all-or-nothing batch writes over named collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs one page of a range query ordered by document id.
    async fn query(&self, request: &QueryRequest) -> Result<DocumentPage, StoreError>;

    /// Commits `ops` atomically: either every write lands or none does.
    async fn batch_write(&self, ops: &[WriteOp]) -> Result<(), StoreError>;
}
