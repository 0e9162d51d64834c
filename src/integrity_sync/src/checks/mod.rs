//! The three reconciliation phases.
//!
//! Each phase fetches both of its inputs concurrently, compares them, and
//! returns its own [`Findings`](crate::findings::Findings). Phases share no
//! mutable state; the orchestrator merges their results once all of them have
//! settled.

mod calls;
mod provider_profiles;
mod users;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::ReconcilerConfig, error::ReconcileError, fetch::PageFetcher, metrics::MetricsMonitor,
};

pub use calls::check_calls;
pub use provider_profiles::check_provider_profiles;
pub use users::check_users;

/// What every phase needs: the fetchers, metrics, configuration and the
/// run's cancellation token.
#[derive(Clone)]
pub struct CheckContext {
    /// Paginated readers over both stores.
    pub fetcher: PageFetcher,
    /// Run-wide metrics.
    pub metrics: Arc<MetricsMonitor>,
    /// Run configuration.
    pub config: Arc<ReconcilerConfig>,
    /// Cancelled on interrupt.
    pub cancel: CancellationToken,
}

impl CheckContext {
    fn ensure_live(&self) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            Err(ReconcileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn missing_fields_description(missing: &[String]) -> String {
    format!("Missing fields: {}", missing.join(", "))
}
