//! Mutations accepted by [`DocumentStore::batch_write`](crate::documents::DocumentStore::batch_write).

use serde::{Deserialize, Serialize};

use crate::models::document::Fields;

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteOp {
    /// Create a document; fails the batch if it already exists.
    Create {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge `fields` into an existing document; fails the batch if it is missing.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Delete a document. Deleting a missing document is not an error.
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Create { id, .. } | WriteOp::Update { id, .. } | WriteOp::Delete { id, .. } => {
                id
            }
        }
    }
}
