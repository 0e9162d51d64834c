use store_gateway::models::Document;
use tracing::info;

use super::{CheckContext, missing_fields_description};
use crate::{
    config::PricingCfg,
    error::ReconcileError,
    fetch::Fetched,
    findings::{EntityKind, Findings, Issue},
    fix::{CallFieldPatch, DEFAULT_CALL_STATUS, Fix, FixKind, OrphanReason},
    records::{CALL_REQUIRED_FIELDS, role_of},
    validate::validate_required_fields,
};

/// Calls against user documents.
///
/// - client or provider without user document: `deleteOrphanCall`, nothing
///   else is checked on that call
/// - otherwise field gaps: `fixCallFields`
pub async fn check_calls(ctx: &CheckContext) -> Result<Findings, ReconcileError> {
    let cfg = &ctx.config;
    let (calls, users) = tokio::try_join!(
        ctx.fetcher.fetch_collection(&cfg.collections.calls, None),
        ctx.fetcher.fetch_collection(&cfg.collections.users, None),
    )?;
    info!(
        calls = calls.len(),
        users = users.len(),
        "call check inputs loaded"
    );

    let mut findings = Findings::default();
    let total = calls.len() as u64;
    for (index, call) in calls.values().enumerate() {
        ctx.ensure_live()?;
        compare_call(call, &users, &cfg.pricing, &mut findings);
        ctx.metrics.report_progress(index as u64 + 1, total, "calls");
    }
    Ok(findings)
}

fn party<'a>(call: &'a Document, field: &str, users: &Fetched<Document>) -> Option<&'a str> {
    call.str_field(field)
        .map(str::trim)
        .filter(|id| users.contains_key(*id))
}

fn compare_call(
    call: &Document,
    users: &Fetched<Document>,
    pricing: &PricingCfg,
    findings: &mut Findings,
) {
    let orphan = |reason: OrphanReason| {
        (
            Issue::new(EntityKind::Call, call.id.as_str(), reason.as_str()),
            Fix::new(call.id.as_str(), FixKind::DeleteOrphanCall { reason }),
        )
    };

    if party(call, "clientId", users).is_none() {
        let (issue, fix) = orphan(OrphanReason::MissingClient);
        findings.issue_with_fix(issue, fix);
        return;
    }
    let Some(provider_id) = party(call, "providerId", users) else {
        let (issue, fix) = orphan(OrphanReason::MissingProvider);
        findings.issue_with_fix(issue, fix);
        return;
    };

    let validation = validate_required_fields(&call.fields, CALL_REQUIRED_FIELDS);
    if validation.is_valid {
        return;
    }

    let provider_kind = users
        .get(provider_id)
        .and_then(role_of)
        .and_then(|r| r.provider_kind());
    let mut patch = CallFieldPatch::default();
    for field in &validation.missing_fields {
        match field.as_str() {
            "serviceType" => {
                patch.service_type = Some(
                    provider_kind
                        .map(|k| format!("{k}_call"))
                        .unwrap_or_else(|| "unknown".to_string()),
                )
            }
            "status" => patch.status = Some(DEFAULT_CALL_STATUS.to_string()),
            "price" => patch.price = Some(provider_kind.map_or(0, |k| pricing.price_for(k))),
            _ => {}
        }
    }

    let issue = Issue::new(
        EntityKind::Call,
        call.id.as_str(),
        missing_fields_description(&validation.missing_fields),
    );
    if patch.is_empty() {
        findings.issue(issue);
    } else {
        findings.issue_with_fix(issue, Fix::new(call.id.as_str(), FixKind::FixCallFields(patch)));
    }
}
