use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use integrity_sync::{
    config::{ReconcilerConfig, load_config_path},
    fix::{ApplySummary, load_plan, write_plan},
    orchestrator::Reconciler,
};
use store_gateway::{
    config::Credentials, documents::firestore_rest::FirestoreRestStore,
    identity::toolkit_rest::ToolkitIdentityProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(version, about = "Reconcile identity accounts with user, profile and call documents")]
struct Cli {
    /// Apply the proposed fixes after the scan.
    #[arg(long)]
    auto_fix: bool,
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Write the scan's issues and fixes to this JSON file.
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,
    /// Skip the scan and apply the fixes of a previously written report.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["report_json", "auto_fix"])]
    apply_plan: Option<PathBuf>,
    /// Identity provider endpoint, e.g. an emulator's `http://localhost:9099/identitytoolkit.googleapis.com/v1`.
    #[arg(long, value_name = "URL")]
    identity_url: Option<String>,
    /// Document store endpoint, e.g. an emulator's `http://localhost:8080/v1`.
    #[arg(long, value_name = "URL")]
    documents_url: Option<String>,
}

enum Outcome {
    Done,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(err) => {
            error!("fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = match &cli.config {
        Some(path) => load_config_path(path)?,
        None => ReconcilerConfig::default(),
    };

    let credentials = Credentials::from_env().context("loading store credentials")?;
    let mut identity = ToolkitIdentityProvider::new(&credentials)
        .context("building identity provider client")?;
    if let Some(url) = cli.identity_url.as_deref() {
        identity = identity.with_base_url(url);
    }
    let mut documents =
        FirestoreRestStore::new(&credentials).context("building document store client")?;
    if let Some(url) = cli.documents_url.as_deref() {
        documents = documents.with_base_url(url);
    }
    info!(project = %credentials.project_id, "stores ready");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    let reconciler =
        Reconciler::with_cancellation(Arc::new(identity), Arc::new(documents), config, cancel);

    if let Some(path) = &cli.apply_plan {
        let entries = load_plan(path)?;
        info!(entries = entries.len(), plan = %path.display(), "applying plan");
        let summary = reconciler.apply_plan_entries(entries).await;
        return Ok(finish_apply(&summary));
    }

    let report = reconciler.run_checks().await;
    if let Some(path) = &cli.report_json {
        write_plan(path, &report.to_plan())?;
        info!(path = %path.display(), "report written");
    }
    if report.interrupted() {
        return Ok(Outcome::Interrupted);
    }
    if report.has_failures() {
        warn!("some phases failed; their findings are missing from this report");
    }

    if cli.auto_fix {
        let summary = reconciler.apply(report.fixes).await;
        return Ok(finish_apply(&summary));
    }
    if !report.fixes.is_empty() {
        info!(
            pending = report.fixes.len(),
            "run with --auto-fix to apply pending fixes"
        );
    }
    Ok(Outcome::Done)
}

fn finish_apply(summary: &ApplySummary) -> Outcome {
    info!(
        applied = summary.applied,
        failed = summary.failed,
        skipped = summary.skipped,
        batches = summary.batches,
        failed_batches = summary.failed_batches,
        isolated = summary.isolated,
        "apply finished"
    );
    if summary.interrupted {
        Outcome::Interrupted
    } else {
        Outcome::Done
    }
}
