mod common;
use common::{Fixture, LogCapture, fast_config, user_body};

use integrity_sync::{
    findings::EntityKind,
    fix::{FixKind, OrphanReason, PlanEntry},
    orchestrator::{Phase, PhaseStatus},
    records::{ProviderKind, Role},
};
use serde_json::json;
use store_gateway::ErrorCode;

#[tokio::test]
async fn email_drift_yields_one_sync_email() {
    let fx = Fixture::new();
    fx.account("u1", "a@x.com")
        .user("u1", user_body("old@x.com", "client"));

    let report = fx.reconciler(fast_config()).run_checks().await;

    assert_eq!(report.issues.len(), 1);
    assert!(report.issues[0].description.contains("Email mismatch"));
    assert_eq!(report.fixes.len(), 1);
    assert_eq!(report.fixes[0].target_id, "u1");
    assert_eq!(
        report.fixes[0].kind,
        FixKind::SyncEmail {
            auth_email: "a@x.com".into()
        }
    );
}

#[tokio::test]
async fn lawyer_without_profile_gets_one_at_lawyer_rate() {
    let fx = Fixture::new();
    fx.member("p1", "lawyer");

    let report = fx.reconciler(fast_config()).run_checks().await;

    let [fix] = report.fixes.as_slice() else {
        panic!("expected one fix, got {:?}", report.fixes);
    };
    assert_eq!(fix.target_id, "p1");
    let FixKind::CreateSosProfile(profile) = &fix.kind else {
        panic!("expected createSOSProfile, got {fix:?}");
    };
    assert_eq!(profile.profile_type, ProviderKind::Lawyer);
    assert_eq!(profile.price, 49);
    assert_eq!(profile.rating, 4.5);
    assert_eq!(profile.review_count, 0);
}

#[tokio::test]
async fn call_with_missing_client_is_only_deleted() {
    let fx = Fixture::new();
    fx.member("p1", "lawyer")
        .profile(
            "p1",
            json!({"uid": "p1", "type": "lawyer", "fullName": "Test User", "rating": 4.5, "price": 49}),
        )
        .call("c1", json!({"clientId": "ghost", "providerId": "p1"}));

    let report = fx.reconciler(fast_config()).run_checks().await;

    let call_fixes: Vec<_> = report
        .fixes
        .iter()
        .filter(|f| f.target_id == "c1")
        .collect();
    assert_eq!(call_fixes.len(), 1);
    assert_eq!(
        call_fixes[0].kind,
        FixKind::DeleteOrphanCall {
            reason: OrphanReason::MissingClient
        }
    );
    let call_issues: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.entity == EntityKind::Call)
        .collect();
    assert_eq!(call_issues.len(), 1);
    assert_eq!(call_issues[0].description, "Missing client");
}

#[tokio::test]
async fn call_field_gaps_are_patched_from_the_provider() {
    let fx = Fixture::new();
    fx.member("c", "client")
        .member("e", "expat")
        .profile(
            "e",
            json!({"uid": "e", "type": "expat", "fullName": "Test User", "rating": 4.5, "price": 19}),
        )
        .call("k1", json!({"clientId": "c", "providerId": "e", "status": "done"}));

    let report = fx.reconciler(fast_config()).run_checks().await;

    let [fix] = report.fixes.as_slice() else {
        panic!("expected one fix, got {:?}", report.fixes);
    };
    let FixKind::FixCallFields(patch) = &fix.kind else {
        panic!("expected fixCallFields, got {fix:?}");
    };
    assert_eq!(patch.service_type.as_deref(), Some("expat_call"));
    assert_eq!(patch.status, None);
    assert_eq!(patch.price, Some(19));
}

#[tokio::test]
async fn orphans_on_both_sides_are_counted_exactly() {
    let fx = Fixture::new();
    for i in 0..3 {
        fx.account(&format!("new{i}"), &format!("new{i}@x.com"));
    }
    for i in 0..2 {
        fx.user(&format!("gone{i}"), user_body(&format!("gone{i}@x.com"), "client"));
    }

    let report = fx.reconciler(fast_config()).run_checks().await;

    let creates: Vec<_> = report
        .fixes
        .iter()
        .filter_map(|f| match &f.kind {
            FixKind::CreateUserDoc(doc) => Some(doc),
            _ => None,
        })
        .collect();
    assert_eq!(creates.len(), 3);
    assert!(creates.iter().all(|d| d.role == Role::Client));

    let deletes = report
        .fixes
        .iter()
        .filter(|f| f.kind == FixKind::DeleteOrphanDoc)
        .count();
    assert_eq!(deletes, 2);
}

#[tokio::test]
async fn repeated_scans_agree() {
    let fx = Fixture::new();
    fx.account("u1", "a@x.com")
        .user("u1", user_body("old@x.com", "client"))
        .account("u2", "b@x.com")
        .user("gone", json!({"role": "lawyer"}))
        .member("p1", "expat")
        .profile("stale", json!({"uid": "nobody", "type": "lawyer"}))
        .call("k1", json!({"clientId": "u1", "providerId": "missing"}));
    let reconciler = fx.reconciler(fast_config());

    let first = reconciler.run_checks().await;
    let second = reconciler.run_checks().await;

    assert!(!first.fixes.is_empty());
    assert_eq!(first.issues, second.issues);
    assert_eq!(first.fixes, second.fixes);
}

#[tokio::test]
async fn failing_phase_does_not_hide_the_others() {
    let fx = Fixture::new();
    fx.member("p1", "lawyer")
        .call("k1", json!({"clientId": "ghost", "providerId": "p1"}));
    fx.identity.fail_next(ErrorCode::PermissionDenied, 1);

    let report = fx.reconciler(fast_config()).run_checks().await;

    assert!(matches!(
        report.phases[0],
        (Phase::Users, PhaseStatus::Failed { .. })
    ));
    assert_eq!(fx.identity.calls(), 1, "permission errors are not retried");
    assert!(matches!(
        report.phases[1],
        (Phase::ProviderProfiles, PhaseStatus::Completed { fixes: 1, .. })
    ));
    assert!(matches!(
        report.phases[2],
        (Phase::Calls, PhaseStatus::Completed { fixes: 1, .. })
    ));
    assert_eq!(report.fixes.len(), 2);
    assert!(report.has_failures());
}

#[tokio::test]
async fn applied_fixes_converge() {
    let fx = Fixture::new();
    fx.account("u1", "a@x.com")
        .user("u1", user_body("old@x.com", "client"))
        .account("u2", "b@x.com")
        .user("gone", user_body("gone@x.com", "client"))
        .member("p1", "lawyer")
        .member("p2", "expat")
        .profile(
            "p2",
            json!({"uid": "p2", "type": "lawyer", "fullName": "Test User", "rating": 4.5, "price": 19}),
        )
        .profile("stale", json!({"uid": "nobody", "type": "lawyer"}))
        .call("k1", json!({"clientId": "u1", "providerId": "ghost"}))
        .call("k2", json!({"clientId": "u1", "providerId": "p1", "serviceType": "lawyer_call"}));
    let reconciler = fx.reconciler(fast_config());

    let first = reconciler.run_checks().await;
    let summary = reconciler.apply(first.fixes.clone()).await;

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.applied, first.fixes.len());
    assert_eq!(summary.batches, 1);

    let second = reconciler.run_checks().await;
    assert!(second.fixes.is_empty(), "left over: {:?}", second.fixes);

    let u2 = fx.documents.get("users", "u2").unwrap();
    assert_eq!(u2.str_field("email"), Some("b@x.com"));
    assert_eq!(u2.str_field("role"), Some("client"));
    assert!(fx.documents.get("users", "gone").is_none());
    assert!(fx.documents.get("calls", "k1").is_none());
    let k2 = fx.documents.get("calls", "k2").unwrap();
    assert_eq!(k2.str_field("status"), Some("pending"));
    assert_eq!(k2.fields["price"], 49);
    let p1 = fx.documents.get("sos_profiles", "p1").unwrap();
    assert_eq!(p1.fields["price"], 49);
    assert_eq!(
        fx.documents.get("sos_profiles", "p2").unwrap().str_field("type"),
        Some("expat")
    );
}

#[tokio::test]
async fn plan_entries_that_are_not_fixes_are_skipped() {
    let fx = Fixture::new();
    fx.user("gone", user_body("gone@x.com", "client"));
    let reconciler = fx.reconciler(fast_config());
    let entries = vec![
        PlanEntry::Known(integrity_sync::fix::Fix::new("gone", FixKind::DeleteOrphanDoc)),
        PlanEntry::Rejected {
            type_name: Some("dropCollection".into()),
            target_id: Some("users".into()),
            reason: "unknown variant".into(),
        },
    ];

    let summary = reconciler.apply_plan_entries(entries).await;

    assert_eq!(summary.applied, 1);
    assert_eq!(summary.skipped, 1);
    assert!(fx.documents.get("users", "gone").is_none());
}

#[tokio::test]
async fn user_check_keeps_identity_order_across_chunks() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let fx = Fixture::new();
    for uid in ["m", "c", "x", "a", "k"] {
        fx.account(uid, &format!("{uid}@x.com"));
    }
    let mut cfg = fast_config();
    cfg.checks.chunk_size = 2;
    cfg.progress.interval = 1;

    let report = fx.reconciler(cfg).run_checks().await;

    let targets: Vec<&str> = report.fixes.iter().map(|f| f.target_id.as_str()).collect();
    assert_eq!(targets, ["m", "c", "x", "a", "k"]);
    assert!(report.fixes.iter().all(|f| f.type_name() == "createUserDoc"));
    assert_eq!(logs.progress("users"), [2, 4, 5]);
}

#[tokio::test]
async fn provider_progress_reaches_the_provider_count() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let fx = Fixture::new();
    fx.member("p1", "lawyer");
    fx.profile(
        "p1",
        json!({"uid": "p1", "type": "lawyer", "fullName": "A B", "rating": 5, "price": 49}),
    );
    fx.member("p2", "expat");
    fx.profile(
        "p2",
        json!({"uid": "p2", "type": "expat", "fullName": "C D", "rating": 5, "price": 19}),
    );
    fx.member("c1", "client");
    let mut cfg = fast_config();
    cfg.progress.interval = 1;

    let report = fx.reconciler(cfg).run_checks().await;

    assert!(report.fixes.is_empty(), "unexpected: {:?}", report.fixes);
    assert_eq!(logs.progress("provider_profiles"), [1, 2]);
}
