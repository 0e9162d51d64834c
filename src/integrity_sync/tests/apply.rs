mod common;
use common::{Fixture, fast_config, user_body};

use integrity_sync::fix::{Fix, FixKind, NewUserDoc, Priority};
use serde_json::json;
use store_gateway::{ErrorCode, models::WriteOp};
use tokio_util::sync::CancellationToken;

fn delete_user(id: String, priority: Priority) -> Fix {
    Fix {
        target_id: id,
        priority,
        kind: FixKind::DeleteOrphanDoc,
    }
}

#[tokio::test]
async fn commits_are_capped_at_the_batch_size() {
    let fx = Fixture::new();
    let fixes: Vec<Fix> = (0..1200)
        .map(|i| Fix::new(format!("u{i:04}"), FixKind::DeleteOrphanDoc))
        .collect();

    let summary = fx.reconciler(fast_config()).apply(fixes).await;

    let sizes: Vec<usize> = fx
        .documents
        .committed_batches()
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, [500, 500, 200]);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.applied, 1200);
}

#[tokio::test]
async fn higher_priorities_are_written_first() {
    let fx = Fixture::new();
    let mut cfg = fast_config();
    cfg.apply.batch_size = 1;
    let fixes = vec![
        delete_user("low-a".into(), Priority::Low),
        delete_user("high-a".into(), Priority::High),
        delete_user("medium-a".into(), Priority::Medium),
        delete_user("low-b".into(), Priority::Low),
        delete_user("high-b".into(), Priority::High),
    ];

    fx.reconciler(cfg).apply(fixes).await;

    let order: Vec<String> = fx
        .documents
        .committed_batches()
        .iter()
        .flat_map(|batch| batch.iter().map(|op| op.id().to_string()))
        .collect();
    assert_eq!(order, ["high-a", "high-b", "medium-a", "low-a", "low-b"]);
}

#[tokio::test]
async fn a_failed_batch_does_not_stop_the_run() {
    let fx = Fixture::new();
    let mut cfg = fast_config();
    cfg.apply.batch_size = 2;
    fx.documents.fail_next_commit(ErrorCode::PermissionDenied, 1);
    let fixes: Vec<Fix> = (0..4)
        .map(|i| Fix::new(format!("u{i}"), FixKind::DeleteOrphanDoc))
        .collect();

    let summary = fx.reconciler(cfg).apply(fixes).await;

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.batches, 1);
    assert_eq!(fx.documents.committed_batches().len(), 1);
}

#[tokio::test]
async fn transient_commit_errors_are_retried() {
    let fx = Fixture::new();
    fx.user("gone", user_body("gone@x.com", "client"));
    fx.documents.fail_next_commit(ErrorCode::Aborted, 2);

    let summary = fx
        .reconciler(fast_config())
        .apply(vec![Fix::new("gone", FixKind::DeleteOrphanDoc)])
        .await;

    assert_eq!(summary.applied, 1);
    assert!(fx.documents.get("users", "gone").is_none());
}

#[tokio::test]
async fn untranslatable_fixes_are_counted_and_skipped() {
    let fx = Fixture::new();
    let fixes = vec![
        Fix::new("", FixKind::DeleteOrphanDoc),
        Fix::new("ok", FixKind::DeleteOrphanDoc),
    ];
    let reconciler = fx.reconciler(fast_config());

    let summary = reconciler.apply(fixes).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(reconciler.metrics().final_report().errors, 1);
    assert_eq!(
        fx.documents.committed_batches(),
        vec![vec![WriteOp::Delete {
            collection: "users".into(),
            id: "ok".into(),
        }]]
    );
}

#[tokio::test]
async fn interrupt_drops_only_the_uncommitted_batch() {
    let fx = Fixture::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let fixes: Vec<Fix> = (0..3)
        .map(|i| Fix::new(format!("u{i}"), FixKind::DeleteOrphanDoc))
        .collect();

    let summary = fx
        .reconciler_with(fast_config(), cancel)
        .apply(fixes)
        .await;

    assert!(summary.interrupted);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.applied, 0);
    assert!(fx.documents.committed_batches().is_empty());
}

#[tokio::test]
async fn one_rejected_fix_does_not_sink_its_batch() {
    let fx = Fixture::new();
    fx.user("taken", user_body("taken@x.com", "client"))
        .user("u1", user_body("old@x.com", "client"))
        .user("gone", user_body("gone@x.com", "client"));
    let fixes = vec![
        Fix::new(
            "taken",
            FixKind::CreateUserDoc(NewUserDoc::client(
                Some("taken@x.com"),
                "Ta".into(),
                "Ken".into(),
            )),
        ),
        Fix::new(
            "u1",
            FixKind::SyncEmail {
                auth_email: "a@x.com".into(),
            },
        ),
        Fix::new("gone", FixKind::DeleteOrphanDoc),
    ];
    let reconciler = fx.reconciler(fast_config());

    let summary = reconciler.apply(fixes).await;

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.isolated, 3);
    assert_eq!(summary.batches, 2);
    assert_eq!(
        fx.documents.get("users", "u1").unwrap().str_field("email"),
        Some("a@x.com")
    );
    assert!(fx.documents.get("users", "gone").is_none());
    assert_eq!(
        fx.documents.get("users", "taken").unwrap().str_field("firstName"),
        Some("Test")
    );
    // Three attempts on the whole batch, three on the rejected fix, plus the
    // fix itself.
    assert_eq!(reconciler.metrics().final_report().errors, 7);
}

#[tokio::test]
async fn batch_wide_failures_are_not_split() {
    let fx = Fixture::new();
    fx.documents.fail_next_commit(ErrorCode::Unavailable, 3);
    let fixes: Vec<Fix> = (0..3)
        .map(|i| Fix::new(format!("u{i}"), FixKind::DeleteOrphanDoc))
        .collect();

    let summary = fx.reconciler(fast_config()).apply(fixes).await;

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.isolated, 0);
    assert!(fx.documents.committed_batches().is_empty());
}

#[tokio::test]
async fn profile_id_held_by_an_orphan_converges_over_two_runs() {
    let fx = Fixture::new();
    fx.account("u1", "a@x.com")
        .user("u1", user_body("old@x.com", "client"));
    fx.member("p1", "lawyer");
    fx.profile(
        "p1",
        json!({"uid": "ghost", "type": "lawyer", "fullName": "G", "rating": 5, "price": 49}),
    );
    let reconciler = fx.reconciler(fast_config());

    let first = reconciler.run_checks().await;
    let kinds: Vec<(&str, &str)> = first
        .fixes
        .iter()
        .map(|f| (f.type_name(), f.target_id.as_str()))
        .collect();
    assert_eq!(kinds, [("syncEmail", "u1"), ("deleteOrphanSOS", "p1")]);
    assert!(
        first
            .issues
            .iter()
            .any(|i| i.description.contains("id taken by profile of ghost"))
    );

    let summary = reconciler.apply(first.fixes).await;
    assert_eq!((summary.applied, summary.failed), (2, 0));
    assert_eq!(
        fx.documents.get("users", "u1").unwrap().str_field("email"),
        Some("a@x.com")
    );

    let second = reconciler.run_checks().await;
    let kinds: Vec<&str> = second.fixes.iter().map(|f| f.type_name()).collect();
    assert_eq!(kinds, ["createSOSProfile"]);
    let summary = reconciler.apply(second.fixes).await;
    assert_eq!(summary.applied, 1);

    let profile = fx.documents.get("sos_profiles", "p1").unwrap();
    assert_eq!(profile.str_field("uid"), Some("p1"));
    assert!(profile.str_field("createdAt").is_some());
    assert!(reconciler.run_checks().await.fixes.is_empty());
}
