//! Runs the three phases side by side, merges their findings, reports, and
//! applies fixes on request.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::Utc;
use store_gateway::{documents::DocumentStore, identity::IdentityProvider};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    checks::{CheckContext, check_calls, check_provider_profiles, check_users},
    config::ReconcilerConfig,
    error::ReconcileError,
    fetch::{FetchSettings, PageFetcher},
    findings::{Findings, Issue},
    fix::{ApplySummary, Fix, FixApplier, Plan, PlanEntry},
    metrics::{FinalReport, MetricsMonitor},
};

/// One reconciliation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Identity accounts against user documents.
    Users,
    /// Providers against provider profiles.
    ProviderProfiles,
    /// Calls against user documents.
    Calls,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Users => "users",
            Phase::ProviderProfiles => "provider_profiles",
            Phase::Calls => "calls",
        })
    }
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Finished; its findings are part of the report.
    Completed {
        /// Issues contributed.
        issues: usize,
        /// Fixes contributed.
        fixes: usize,
    },
    /// Failed; contributed nothing.
    Failed {
        /// Rendered error.
        error: String,
    },
    /// Interrupted; contributed nothing.
    Cancelled,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Completed { issues, fixes } => {
                write!(f, "completed ({issues} issues, {fixes} fixes)")
            }
            PhaseStatus::Failed { error } => write!(f, "failed: {error}"),
            PhaseStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of [`Reconciler::run_checks`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every phase in fixed order with its status.
    pub phases: Vec<(Phase, PhaseStatus)>,
    /// Merged issues, phase by phase.
    pub issues: Vec<Issue>,
    /// Merged fixes, phase by phase.
    pub fixes: Vec<Fix>,
    /// Performance figures at the end of the scan.
    pub metrics: FinalReport,
}

impl RunReport {
    /// `true` if any phase was interrupted.
    pub fn interrupted(&self) -> bool {
        self.phases
            .iter()
            .any(|(_, status)| *status == PhaseStatus::Cancelled)
    }

    /// `true` if any phase failed.
    pub fn has_failures(&self) -> bool {
        self.phases
            .iter()
            .any(|(_, status)| matches!(status, PhaseStatus::Failed { .. }))
    }

    /// Phase statuses, counts, the first `preview_limit` issues with a
    /// truncation notice, and the pending-fix count.
    pub fn render(&self, preview_limit: usize) -> String {
        let mut out = String::new();
        for (phase, status) in &self.phases {
            let _ = writeln!(out, "phase {phase}: {status}");
        }
        let _ = writeln!(
            out,
            "{} issues, {} fixes",
            self.issues.len(),
            self.fixes.len()
        );
        for issue in self.issues.iter().take(preview_limit) {
            let _ = writeln!(out, "  {issue}");
        }
        if self.issues.len() > preview_limit {
            let _ = writeln!(
                out,
                "  ... and {} more issues",
                self.issues.len() - preview_limit
            );
        }
        let _ = write!(out, "{} fixes pending", self.fixes.len());
        out
    }

    /// The report as a plan file.
    pub fn to_plan(&self) -> Plan {
        Plan {
            generated_at: Utc::now(),
            issues: self.issues.clone(),
            fixes: self.fixes.clone(),
        }
    }
}

/// Wires the stores, fetchers, checks and applier for one run.
pub struct Reconciler {
    ctx: CheckContext,
    documents: Arc<dyn DocumentStore>,
}

impl Reconciler {
    /// Reconciler with its own cancellation token.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self::with_cancellation(identity, documents, config, CancellationToken::new())
    }

    /// Reconciler that stops when `cancel` fires.
    pub fn with_cancellation(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        config: ReconcilerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let metrics = Arc::new(MetricsMonitor::from_config(&config));
        let fetcher = PageFetcher::new(
            identity,
            Arc::clone(&documents),
            Arc::clone(&metrics),
            config.retry.policy(),
            FetchSettings::from(&config),
            cancel.clone(),
        );
        Self {
            ctx: CheckContext {
                fetcher,
                metrics,
                config: Arc::new(config),
                cancel,
            },
            documents,
        }
    }

    /// Run-wide metrics.
    pub fn metrics(&self) -> &Arc<MetricsMonitor> {
        &self.ctx.metrics
    }

    /// Runs all three phases concurrently and merges what the successful
    /// ones found. A failing phase is logged and contributes nothing.
    pub async fn run_checks(&self) -> RunReport {
        info!("starting integrity checks");
        let (users, profiles, calls) = tokio::join!(
            check_users(&self.ctx),
            check_provider_profiles(&self.ctx),
            check_calls(&self.ctx),
        );

        let mut merged = Findings::default();
        let mut phases = Vec::with_capacity(3);
        for (phase, result) in [
            (Phase::Users, users),
            (Phase::ProviderProfiles, profiles),
            (Phase::Calls, calls),
        ] {
            let status = match result {
                Ok(found) => {
                    let status = PhaseStatus::Completed {
                        issues: found.issues.len(),
                        fixes: found.fixes.len(),
                    };
                    info!(%phase, %status, "phase finished");
                    merged.extend(found);
                    status
                }
                Err(ReconcileError::Cancelled) => {
                    warn!(%phase, "phase cancelled");
                    PhaseStatus::Cancelled
                }
                Err(err) => {
                    error!(%phase, error = %err, "phase failed");
                    PhaseStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            phases.push((phase, status));
        }

        let report = RunReport {
            phases,
            issues: merged.issues,
            fixes: merged.fixes,
            metrics: self.ctx.metrics.final_report(),
        };
        info!(metrics = %report.metrics, "final report");
        for line in report
            .render(self.ctx.config.checks.issue_preview_limit)
            .lines()
        {
            info!("{line}");
        }
        report
    }

    fn applier(&self) -> FixApplier {
        FixApplier::new(
            Arc::clone(&self.documents),
            Arc::clone(&self.ctx.metrics),
            &self.ctx.config,
            self.ctx.cancel.clone(),
        )
    }

    /// Applies `fixes` highest priority first in bounded batches.
    pub async fn apply(&self, fixes: Vec<Fix>) -> ApplySummary {
        self.applier().apply(fixes).await
    }

    /// Applies the recognised entries of a plan file. Rejected entries are
    /// logged and counted as skipped.
    pub async fn apply_plan_entries(&self, entries: Vec<PlanEntry>) -> ApplySummary {
        let mut fixes = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for entry in entries {
            match entry {
                PlanEntry::Known(fix) => fixes.push(fix),
                PlanEntry::Rejected {
                    type_name,
                    target_id,
                    reason,
                } => {
                    warn!(
                        fix_type = type_name.as_deref().unwrap_or("<none>"),
                        target_id = target_id.as_deref().unwrap_or("<none>"),
                        reason = %reason,
                        "skipping unrecognised plan entry"
                    );
                    rejected += 1;
                }
            }
        }

        let mut summary = self.apply(fixes).await;
        summary.skipped += rejected;
        summary
    }
}
