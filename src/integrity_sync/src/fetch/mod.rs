//! Cursor-based readers over the two stores.
//!
//! Both fetchers page strictly sequentially, route every page request through
//! the [`RetryPolicy`], record each call with the [`MetricsMonitor`], pause
//! when tracked memory crosses the threshold, and sleep a fixed delay between
//! pages. A page that still fails after retries fails the whole fetch; the
//! records gathered so far are dropped along with their memory accounting.

mod documents;
mod identity;

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use store_gateway::{documents::DocumentStore, identity::IdentityProvider};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    config::ReconcilerConfig, error::ReconcileError, metrics::MetricsMonitor,
    metrics::ResidentGuard, retry::RetryPolicy,
};

/// Paging and throttling knobs shared by both fetchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Accounts per identity page.
    pub identity_page_size: usize,
    /// Documents per collection page.
    pub document_page_size: usize,
    /// Sleep between pages.
    pub rate_limit_delay: Duration,
    /// Sleep when memory pressure is detected.
    pub memory_pause: Duration,
}

impl From<&ReconcilerConfig> for FetchSettings {
    fn from(cfg: &ReconcilerConfig) -> Self {
        Self {
            identity_page_size: cfg.fetch.identity_page_size,
            document_page_size: cfg.fetch.document_page_size,
            rate_limit_delay: cfg.fetch.rate_limit_delay(),
            memory_pause: cfg.fetch.memory_pause(),
        }
    }
}

/// An id-keyed record set whose estimated size is charged to the monitor
/// for as long as it lives.
#[derive(Debug)]
pub struct Fetched<T> {
    records: IndexMap<String, T>,
    _resident: ResidentGuard,
}

impl<T> Deref for Fetched<T> {
    type Target = IndexMap<String, T>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Both paginated fetchers over one pair of stores.
#[derive(Clone)]
pub struct PageFetcher {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
    metrics: Arc<MetricsMonitor>,
    retry: RetryPolicy,
    settings: FetchSettings,
    cancel: CancellationToken,
}

impl PageFetcher {
    /// Fetcher over `identity` and `documents`.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        metrics: Arc<MetricsMonitor>,
        retry: RetryPolicy,
        settings: FetchSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            documents,
            metrics,
            retry,
            settings,
            cancel,
        }
    }

    /// Samples memory, backs off under pressure, then applies the fixed
    /// inter-page delay. Returns `Cancelled` if the run was interrupted.
    async fn throttle(&self, source: &str) -> Result<(), ReconcileError> {
        self.metrics.record_memory_usage();
        if self.metrics.should_pause_for_memory() {
            warn!(
                source,
                resident_bytes = self.metrics.resident_bytes(),
                pause_ms = self.settings.memory_pause.as_millis() as u64,
                "memory pressure, pausing fetch"
            );
            self.sleep(self.settings.memory_pause).await?;
        }
        self.sleep(self.settings.rate_limit_delay).await
    }

    async fn sleep(&self, delay: Duration) -> Result<(), ReconcileError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn ensure_live(&self) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            Err(ReconcileError::Cancelled)
        } else {
            Ok(())
        }
    }
}
