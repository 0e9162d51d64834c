//! Priority-ordered, batched application of fixes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use store_gateway::documents::DocumentStore;
use store_gateway::models::{Fields, WriteOp, timestamp_value};
use store_gateway::{ErrorCode, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{CallFieldPatch, Fix, FixKind, NewProviderProfile, NewUserDoc, UserFieldPatch};
use crate::{
    config::{CollectionsCfg, ReconcilerConfig},
    metrics::MetricsMonitor,
    retry::{RetryPolicy, timed},
};

/// A fix that cannot be turned into store writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FixError {
    /// No target document.
    #[error("{kind}: empty target id")]
    EmptyTarget {
        /// Fix type.
        kind: &'static str,
    },
    /// Target id is not a valid document id.
    #[error("{kind}: invalid target id {target:?}")]
    InvalidTarget {
        /// Fix type.
        kind: &'static str,
        /// Offending id.
        target: String,
    },
    /// A field patch with nothing to write.
    #[error("{kind} for {target}: nothing to patch")]
    EmptyPatch {
        /// Fix type.
        kind: &'static str,
        /// Target id.
        target: String,
    },
}

/// Stable sort, highest priority first.
pub fn prioritized(mut fixes: Vec<Fix>) -> Vec<Fix> {
    fixes.sort_by_key(|f| std::cmp::Reverse(f.priority.weight()));
    fixes
}

/// Store writes that carry out `fix`. `now` stamps any `createdAt` it sets.
pub fn write_ops(
    fix: &Fix,
    collections: &CollectionsCfg,
    now: DateTime<Utc>,
) -> Result<Vec<WriteOp>, FixError> {
    let kind = fix.type_name();
    let id = fix.target_id.trim();
    if id.is_empty() {
        return Err(FixError::EmptyTarget { kind });
    }
    if id.contains('/') {
        return Err(FixError::InvalidTarget {
            kind,
            target: fix.target_id.clone(),
        });
    }
    let id = id.to_string();
    let stamp = timestamp_value(now);

    let op = match &fix.kind {
        FixKind::CreateUserDoc(doc) => WriteOp::Create {
            collection: collections.users.clone(),
            id,
            fields: new_user_fields(doc, &stamp),
        },
        FixKind::DeleteOrphanDoc => WriteOp::Delete {
            collection: collections.users.clone(),
            id,
        },
        FixKind::FixUserFields(patch) => {
            let fields = user_patch_fields(patch, &stamp);
            if fields.is_empty() {
                return Err(FixError::EmptyPatch { kind, target: id });
            }
            WriteOp::Update {
                collection: collections.users.clone(),
                id,
                fields,
            }
        }
        FixKind::SyncEmail { auth_email } => WriteOp::Update {
            collection: collections.users.clone(),
            id,
            fields: object(json!({ "email": auth_email })),
        },
        FixKind::CreateSosProfile(profile) => WriteOp::Create {
            collection: collections.provider_profiles.clone(),
            fields: new_profile_fields(&id, profile, &stamp),
            id,
        },
        FixKind::DeleteOrphanSos => WriteOp::Delete {
            collection: collections.provider_profiles.clone(),
            id,
        },
        FixKind::SyncSosType { expected_type } => WriteOp::Update {
            collection: collections.provider_profiles.clone(),
            id,
            fields: object(json!({ "type": expected_type })),
        },
        FixKind::DeleteOrphanCall { .. } => WriteOp::Delete {
            collection: collections.calls.clone(),
            id,
        },
        FixKind::FixCallFields(patch) => {
            let fields = call_patch_fields(patch);
            if fields.is_empty() {
                return Err(FixError::EmptyPatch { kind, target: id });
            }
            WriteOp::Update {
                collection: collections.calls.clone(),
                id,
                fields,
            }
        }
    };
    Ok(vec![op])
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn new_user_fields(doc: &NewUserDoc, stamp: &Value) -> Fields {
    let mut fields = object(json!({
        "role": doc.role,
        "firstName": doc.first_name,
        "lastName": doc.last_name,
        "displayName": doc.display_name,
        "isActive": doc.is_active,
        "isApproved": doc.is_approved,
        "isVerified": doc.is_verified,
        "createdAt": stamp,
    }));
    if let Some(email) = &doc.email {
        fields.insert("email".into(), json!(email));
    }
    fields
}

fn user_patch_fields(patch: &UserFieldPatch, stamp: &Value) -> Fields {
    let mut fields = Fields::new();
    if let Some(email) = &patch.email {
        fields.insert("email".into(), json!(email));
    }
    if let Some(role) = patch.role {
        fields.insert("role".into(), json!(role));
    }
    if let Some(first) = &patch.first_name {
        fields.insert("firstName".into(), json!(first));
    }
    if let Some(last) = &patch.last_name {
        fields.insert("lastName".into(), json!(last));
    }
    if patch.set_created_at {
        fields.insert("createdAt".into(), stamp.clone());
    }
    fields
}

fn new_profile_fields(uid: &str, profile: &NewProviderProfile, stamp: &Value) -> Fields {
    let mut fields = object(json!({
        "uid": uid,
        "type": profile.profile_type,
        "fullName": profile.full_name,
        "rating": profile.rating,
        "reviewCount": profile.review_count,
        "price": profile.price,
        "isActive": profile.is_active,
        "createdAt": stamp,
    }));
    if let Some(email) = &profile.email {
        fields.insert("email".into(), json!(email));
    }
    fields
}

fn call_patch_fields(patch: &CallFieldPatch) -> Fields {
    let mut fields = Fields::new();
    if let Some(service_type) = &patch.service_type {
        fields.insert("serviceType".into(), json!(service_type));
    }
    if let Some(status) = &patch.status {
        fields.insert("status".into(), json!(status));
    }
    if let Some(price) = patch.price {
        fields.insert("price".into(), json!(price));
    }
    fields
}

/// Outcome of [`FixApplier::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Fixes whose batch committed.
    pub applied: usize,
    /// Fixes that could not be translated or could not be committed.
    pub failed: usize,
    /// Fixes never attempted (unrecognised plan entries, interrupt).
    pub skipped: usize,
    /// Commits that landed, single-fix re-commits included.
    pub batches: usize,
    /// Batches that failed after retries.
    pub failed_batches: usize,
    /// Fixes re-committed one at a time after their batch was rejected.
    pub isolated: usize,
    /// The run was cancelled before all fixes were attempted.
    pub interrupted: bool,
}

/// Writes fixes to the document store in bounded atomic batches.
pub struct FixApplier {
    store: Arc<dyn DocumentStore>,
    metrics: Arc<MetricsMonitor>,
    retry: RetryPolicy,
    collections: CollectionsCfg,
    batch_size: usize,
    rate_limit_delay: Duration,
    cancel: CancellationToken,
}

/// Writes of one fix, kept together so a rejected batch can be split.
struct PendingFix {
    kind: &'static str,
    target_id: String,
    ops: Vec<WriteOp>,
}

/// Fixes accumulated for the next commit.
#[derive(Default)]
struct PendingBatch {
    fixes: Vec<PendingFix>,
    writes: usize,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    fn push(&mut self, fix: &Fix, ops: Vec<WriteOp>) {
        self.writes += ops.len();
        self.fixes.push(PendingFix {
            kind: fix.type_name(),
            target_id: fix.target_id.clone(),
            ops,
        });
    }
}

/// Codes that blame one document of a batch rather than the batch as a whole.
fn rejects_single_write(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::AlreadyExists | ErrorCode::NotFound | ErrorCode::InvalidArgument
    )
}

impl FixApplier {
    /// Applier configured from `[apply]`, `[fetch]`, `[retry]` and `[collections]`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        metrics: Arc<MetricsMonitor>,
        cfg: &ReconcilerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            metrics,
            retry: cfg.retry.policy(),
            collections: cfg.collections.clone(),
            batch_size: cfg.apply.batch_size.max(1),
            rate_limit_delay: cfg.fetch.rate_limit_delay(),
            cancel,
        }
    }

    /// Applies `fixes` highest priority first.
    ///
    /// A fix that cannot be translated is logged, counted as failed, and
    /// skipped. A batch rejected because of one of its documents is
    /// re-committed fix by fix so only the offending fixes fail. Any other
    /// batch failure marks its fixes failed and the run continues. On
    /// cancellation the uncommitted batch is dropped and everything not yet
    /// committed is counted as skipped.
    pub async fn apply(&self, fixes: Vec<Fix>) -> ApplySummary {
        let ordered = prioritized(fixes);
        let total = ordered.len();
        let now = Utc::now();
        let mut summary = ApplySummary::default();
        let mut batch = PendingBatch::default();

        info!(total, batch_size = self.batch_size, "applying fixes");

        for (index, fix) in ordered.iter().enumerate() {
            let ops = match write_ops(fix, &self.collections, now) {
                Ok(ops) => ops,
                Err(err) => {
                    warn!(target_id = %fix.target_id, error = %err, "skipping fix");
                    self.metrics.record_operation(Duration::ZERO, false);
                    summary.failed += 1;
                    continue;
                }
            };

            if !batch.is_empty()
                && batch.writes + ops.len() > self.batch_size
                && !self.commit_full(&mut batch, &mut summary).await
            {
                summary.skipped += total - index;
                return summary;
            }
            batch.push(fix, ops);

            if batch.writes >= self.batch_size
                && !self.commit_full(&mut batch, &mut summary).await
            {
                summary.skipped += total - index - 1;
                return summary;
            }
        }

        if !batch.is_empty() {
            self.commit(&mut batch, &mut summary).await;
        }
        info!(
            applied = summary.applied,
            failed = summary.failed,
            skipped = summary.skipped,
            batches = summary.batches,
            isolated = summary.isolated,
            "fixes applied"
        );
        summary
    }

    /// Commits a full batch and sleeps the rate-limit delay. Returns `false`
    /// when the run was cancelled.
    async fn commit_full(&self, batch: &mut PendingBatch, summary: &mut ApplySummary) -> bool {
        if !self.commit(batch, summary).await {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.rate_limit_delay) => {}
        }
        true
    }

    /// Commits `batch` through the retry policy and resets it. Returns `false`
    /// (and drops what is left of the batch) when the run was cancelled.
    async fn commit(&self, batch: &mut PendingBatch, summary: &mut ApplySummary) -> bool {
        let PendingBatch { fixes, writes } = std::mem::take(batch);

        if self.cancel.is_cancelled() {
            warn!(dropped = fixes.len(), "interrupted, uncommitted batch dropped");
            summary.skipped += fixes.len();
            summary.interrupted = true;
            return false;
        }

        let ops: Vec<WriteOp> = fixes.iter().flat_map(|f| f.ops.iter().cloned()).collect();
        match self.write(&ops).await {
            Ok(()) => {
                summary.applied += fixes.len();
                summary.batches += 1;
                info!(batch = summary.batches, writes, "batch committed");
                true
            }
            Err(err) if fixes.len() > 1 && rejects_single_write(err.code()) => {
                warn!(
                    fixes = fixes.len(),
                    code = %err.code(),
                    error = %err,
                    "batch rejected, committing its fixes one at a time"
                );
                summary.failed_batches += 1;
                self.commit_each(fixes, summary).await
            }
            Err(err) => {
                error!(writes, code = %err.code(), error = %err, "batch failed");
                for fix in &fixes {
                    self.fix_failed(fix, &err);
                }
                summary.failed += fixes.len();
                summary.failed_batches += 1;
                true
            }
        }
    }

    /// Commits each fix of a rejected batch on its own.
    async fn commit_each(&self, fixes: Vec<PendingFix>, summary: &mut ApplySummary) -> bool {
        let total = fixes.len();
        for (done, fix) in fixes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(dropped = total - done, "interrupted, uncommitted fixes dropped");
                summary.skipped += total - done;
                summary.interrupted = true;
                return false;
            }
            summary.isolated += 1;
            match self.write(&fix.ops).await {
                Ok(()) => {
                    summary.applied += 1;
                    summary.batches += 1;
                }
                Err(err) => {
                    self.fix_failed(fix, &err);
                    summary.failed += 1;
                }
            }
        }
        true
    }

    async fn write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        self.retry
            .execute("commit", || timed(&self.metrics, self.store.batch_write(ops)))
            .await
    }

    fn fix_failed(&self, fix: &PendingFix, err: &StoreError) {
        warn!(
            fix_type = fix.kind,
            target_id = %fix.target_id,
            code = %err.code(),
            "fix not applied"
        );
        self.metrics.record_operation(Duration::ZERO, false);
    }
}
