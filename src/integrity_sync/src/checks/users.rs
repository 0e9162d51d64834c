use futures::{StreamExt, stream};
use store_gateway::models::{Document, IdentityRecord};
use tracing::info;

use super::{CheckContext, missing_fields_description};
use crate::{
    error::ReconcileError,
    findings::{EntityKind, Findings, Issue},
    fix::{Fix, FixKind, NewUserDoc, UserFieldPatch},
    records::{Role, USER_REQUIRED_FIELDS, split_display_name},
    validate::validate_required_fields,
};

/// Identity accounts against user documents.
///
/// - account without document: `createUserDoc`
/// - document without account: `deleteOrphanDoc`
/// - both present: `fixUserFields` for gaps, `syncEmail` when the emails differ
pub async fn check_users(ctx: &CheckContext) -> Result<Findings, ReconcileError> {
    let cfg = &ctx.config;
    let (identities, users) = tokio::try_join!(
        ctx.fetcher.fetch_identities(),
        ctx.fetcher.fetch_collection(&cfg.collections.users, None),
    )?;
    info!(
        identities = identities.len(),
        users = users.len(),
        "user check inputs loaded"
    );

    let mut findings = Findings::default();
    let accounts: Vec<&IdentityRecord> = identities.values().collect();
    let total = accounts.len() as u64;
    let mut done = 0u64;
    let users_ref = &users;

    for chunk in accounts.chunks(cfg.checks.chunk_size.max(1)) {
        ctx.ensure_live()?;

        let per_entry: Vec<Findings> = stream::iter(chunk.iter().copied())
            .map(move |identity| async move { compare_account(identity, users_ref.get(&identity.uid)) })
            .buffered(cfg.checks.chunk_concurrency.max(1))
            .collect()
            .await;
        for entry in per_entry {
            findings.extend(entry);
        }

        done += chunk.len() as u64;
        ctx.metrics.report_progress(done, total, "users");
    }

    for (id, _) in users.iter() {
        if !identities.contains_key(id) {
            findings.issue_with_fix(
                Issue::new(EntityKind::User, id.as_str(), "User document without identity account"),
                Fix::new(id.as_str(), FixKind::DeleteOrphanDoc),
            );
        }
    }

    Ok(findings)
}

fn compare_account(identity: &IdentityRecord, user: Option<&Document>) -> Findings {
    let mut findings = Findings::default();
    let uid = identity.uid.as_str();

    let Some(user) = user else {
        let (first, last) = split_display_name(identity.display_name.as_deref());
        findings.issue_with_fix(
            Issue::new(EntityKind::User, uid, "Identity account without user document"),
            Fix::new(
                uid,
                FixKind::CreateUserDoc(NewUserDoc::client(identity.email.as_deref(), first, last)),
            ),
        );
        return findings;
    };

    let validation = validate_required_fields(&user.fields, USER_REQUIRED_FIELDS);
    if !validation.is_valid {
        let issue = Issue::new(
            EntityKind::User,
            uid,
            missing_fields_description(&validation.missing_fields),
        );
        let patch = user_patch(identity, &validation.missing_fields);
        if patch.is_empty() {
            findings.issue(issue);
        } else {
            findings.issue_with_fix(issue, Fix::new(uid, FixKind::FixUserFields(patch)));
        }
    }

    let doc_email = user
        .str_field("email")
        .map(str::trim)
        .filter(|e| !e.is_empty());
    match (identity.email.as_deref(), doc_email) {
        (Some(auth), Some(doc)) if auth != doc => findings.issue_with_fix(
            Issue::new(
                EntityKind::User,
                uid,
                format!("Email mismatch: auth={auth}, doc={doc}"),
            ),
            Fix::new(
                uid,
                FixKind::SyncEmail {
                    auth_email: auth.to_string(),
                },
            ),
        ),
        _ => {}
    }

    findings
}

fn user_patch(identity: &IdentityRecord, missing: &[String]) -> UserFieldPatch {
    let (first, last) = split_display_name(identity.display_name.as_deref());
    let mut patch = UserFieldPatch::default();
    for field in missing {
        match field.as_str() {
            "email" => patch.email = identity.email.clone(),
            "role" => patch.role = Some(Role::Client),
            "firstName" => patch.first_name = Some(first.clone()),
            "lastName" => patch.last_name = Some(last.clone()),
            "createdAt" => patch.set_created_at = true,
            _ => {}
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_drift_yields_sync_email() {
        let identity = IdentityRecord::new("u1", Some("a@x.com"), Some("Ada Lovelace"));
        let user = Document::from_json(
            "u1",
            json!({
                "email": "old@x.com",
                "role": "client",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "createdAt": "2024-01-01T00:00:00Z",
            }),
        );

        let findings = compare_account(&identity, Some(&user));

        assert_eq!(findings.issues.len(), 1);
        assert!(findings.issues[0].description.contains("Email mismatch"));
        assert_eq!(
            findings.fixes,
            vec![Fix::new(
                "u1",
                FixKind::SyncEmail {
                    auth_email: "a@x.com".into()
                }
            )]
        );
    }

    #[test]
    fn missing_fields_are_patched_from_the_identity() {
        let identity = IdentityRecord::new("u1", Some("a@x.com"), Some("Grace Brewster Hopper"));
        let user = Document::from_json("u1", json!({"role": "lawyer", "firstName": " "}));

        let findings = compare_account(&identity, Some(&user));

        let [fix] = findings.fixes.as_slice() else {
            panic!("expected one fix, got {:?}", findings.fixes);
        };
        let FixKind::FixUserFields(patch) = &fix.kind else {
            panic!("expected fixUserFields, got {fix:?}");
        };
        assert_eq!(patch.email.as_deref(), Some("a@x.com"));
        assert_eq!(patch.role, None);
        assert_eq!(patch.first_name.as_deref(), Some("Grace"));
        assert_eq!(patch.last_name.as_deref(), Some("Brewster Hopper"));
        assert!(patch.set_created_at);
    }

    #[test]
    fn account_without_document_becomes_client() {
        let identity = IdentityRecord::new("u9", None, None);
        let findings = compare_account(&identity, None);
        let FixKind::CreateUserDoc(doc) = &findings.fixes[0].kind else {
            panic!("expected createUserDoc");
        };
        assert_eq!(doc.role, Role::Client);
        assert_eq!(doc.first_name, "Unknown");
        assert_eq!(doc.last_name, "Unknown");
        assert!(doc.is_active && doc.is_approved && !doc.is_verified);
    }
}
