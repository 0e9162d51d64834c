#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use integrity_sync::{config::ReconcilerConfig, orchestrator::Reconciler};
use serde_json::Value;
use store_gateway::{
    memory::{InMemoryDocumentStore, InMemoryIdentityProvider},
    models::{Document, IdentityRecord},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

/// Defaults with every sleep removed.
pub fn fast_config() -> ReconcilerConfig {
    let mut cfg = ReconcilerConfig::default();
    cfg.fetch.rate_limit_delay_ms = 0;
    cfg.fetch.memory_pause_ms = 0;
    cfg.retry.base_delay_ms = 1;
    cfg
}

/// A complete, valid user document body.
pub fn user_body(email: &str, role: &str) -> Value {
    serde_json::json!({
        "email": email,
        "role": role,
        "firstName": "Test",
        "lastName": "User",
        "createdAt": "2024-05-01T00:00:00Z",
    })
}

pub struct Fixture {
    pub identity: Arc<InMemoryIdentityProvider>,
    pub documents: Arc<InMemoryDocumentStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(InMemoryIdentityProvider::default()),
            documents: Arc::new(InMemoryDocumentStore::new()),
        }
    }

    pub fn account(&self, uid: &str, email: &str) -> &Self {
        self.identity
            .push(IdentityRecord::new(uid, Some(email), Some("Test User")));
        self
    }

    pub fn user(&self, uid: &str, body: Value) -> &Self {
        self.documents.insert("users", Document::from_json(uid, body));
        self
    }

    /// Identity account plus a matching valid user document.
    pub fn member(&self, uid: &str, role: &str) -> &Self {
        let email = format!("{uid}@x.com");
        self.account(uid, &email).user(uid, user_body(&email, role))
    }

    pub fn profile(&self, id: &str, body: Value) -> &Self {
        self.documents
            .insert("sos_profiles", Document::from_json(id, body));
        self
    }

    pub fn call(&self, id: &str, body: Value) -> &Self {
        self.documents.insert("calls", Document::from_json(id, body));
        self
    }

    pub fn reconciler(&self, config: ReconcilerConfig) -> Reconciler {
        self.reconciler_with(config, CancellationToken::new())
    }

    pub fn reconciler_with(&self, config: ReconcilerConfig, cancel: CancellationToken) -> Reconciler {
        Reconciler::with_cancellation(
            self.identity.clone(),
            self.documents.clone(),
            config,
            cancel,
        )
    }
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Routes this thread's events into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
    }

    /// `current` of every progress line logged under `label`, in order.
    pub fn progress(&self, label: &str) -> Vec<u64> {
        self.contents()
            .lines()
            .filter_map(|line| {
                let mut current = None;
                let mut labelled = false;
                for token in line.split_whitespace() {
                    if let Some(value) = token.strip_prefix("label=") {
                        labelled = value.trim_matches('"') == label;
                    }
                    if let Some(value) = token.strip_prefix("current=") {
                        current = value.parse().ok();
                    }
                }
                if labelled { current } else { None }
            })
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
