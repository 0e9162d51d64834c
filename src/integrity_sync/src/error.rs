//! Crate-level error type.

use std::path::PathBuf;

use store_gateway::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Everything that can stop a reconciliation step.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A remote call failed after the retry budget was spent.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run was interrupted before this step finished.
    #[error("cancelled")]
    Cancelled,

    /// A plan file could not be read or written.
    #[error("plan file {path}: {source}")]
    PlanIo {
        /// Plan file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A plan file is not a JSON report.
    #[error("plan file {path} is not a valid report: {source}")]
    PlanFormat {
        /// Plan file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}
