//! Change detection, error policies, retries and dry runs

use std::sync::Arc;

use cloudmirror_core::domain::errors::RemoteErrorKind;
use cloudmirror_core::domain::mapping::ExclusionSet;
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::policy::{ChangeDetection, MappingErrorPolicy};
use cloudmirror_sync::{DryRunStore, EngineOptions, ReconciliationEngine, RetryPolicy, SyncError};

use crate::common::{self, set, Call, MemoryStore, ROOT};

// ============================================================================
// Change detection
// ============================================================================

#[tokio::test]
async fn test_size_and_modified_uploads_only_changed_files() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("same.txt", "same"), ("edited.txt", "v1")]);

    let store = MemoryStore::new();
    let options = EngineOptions {
        change_detection: ChangeDetection::SizeAndModified,
        ..EngineOptions::default()
    };
    let engine = common::engine_with(&store, ExclusionSet::default(), options);
    let mappings = [common::mapping(&local, "")];
    engine.run(&mappings).await.unwrap();

    std::fs::write(local.join("edited.txt"), "version two").unwrap();
    store.clear_calls();
    let report = engine.run(&mappings).await.unwrap();

    let edited = store.id_of(ROOT, "root/edited.txt").unwrap();
    let root_id = store.id_of(ROOT, "root").unwrap();
    assert_eq!(
        store.calls().into_iter().filter(Call::is_update).collect::<Vec<_>>(),
        vec![Call::UpdateFile {
            id: edited.to_string(),
            parent: root_id.to_string()
        }]
    );
    assert_eq!(report.mappings[0].files_updated, 1);
    assert_eq!(report.mappings[0].files_unchanged, 1);
}

// ============================================================================
// Kind mismatches
// ============================================================================

#[tokio::test]
async fn test_remote_file_replaced_by_local_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("docs/readme.md", "# docs"), ("data", "now a file")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    let docs_file = store.seed_file(root_id.as_str(), "docs", b"was a file");
    let data_folder = store.seed_folder(root_id.as_str(), "data");
    store.seed_file(data_folder.as_str(), "inner.csv", b"1,2");

    let report = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap();

    assert_eq!(
        store.tree(ROOT),
        set(["root/", "root/data", "root/docs/", "root/docs/readme.md"])
    );
    let deletes: Vec<Call> = store.calls().into_iter().filter(Call::is_delete).collect();
    assert_eq!(
        deletes,
        vec![
            Call::DeleteNode {
                id: data_folder.to_string()
            },
            Call::DeleteNode {
                id: docs_file.to_string()
            },
        ]
    );
    assert_eq!(report.mappings[0].nodes_deleted, 2);
}

#[tokio::test]
async fn test_kind_mismatch_at_mapping_target_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a")]);

    let store = MemoryStore::new();
    store.seed_file(ROOT, "root", b"a file where the folder should be");

    let err = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    match err {
        SyncError::MappingFailed { source, .. } => {
            assert!(matches!(*source, SyncError::Consistency(_)), "{source}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.creates(), 0);
    assert_eq!(store.deletes(), 0);
}

// ============================================================================
// Mapping error policy
// ============================================================================

fn two_mappings(tmp: &std::path::Path) -> Vec<cloudmirror_core::domain::mapping::Mapping> {
    let bad = tmp.join("bad");
    let good = tmp.join("good");
    common::write_tree(&bad, &[("a.txt", "a")]);
    common::write_tree(&good, &[("b.txt", "b")]);
    vec![common::mapping(&bad, ""), common::mapping(&good, "")]
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failing_mapping() {
    let tmp = tempfile::tempdir().unwrap();
    let mappings = two_mappings(tmp.path());

    let store = MemoryStore::new();
    store.fail("create_folder", Some("bad"), "HTTP 403 Forbidden");

    let err = common::engine_with(&store, ExclusionSet::default(), common::no_retry())
        .run(&mappings)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MappingFailed { .. }));
    assert!(err.chain().contains("HTTP 403 Forbidden"), "{}", err.chain());
    assert!(store.tree(ROOT).is_empty());
    assert!(!store.calls().iter().any(|call| matches!(
        call,
        Call::FindChild { name, .. } if name == "good"
    )));
}

#[tokio::test]
async fn test_continue_and_report_runs_remaining_mappings() {
    let tmp = tempfile::tempdir().unwrap();
    let mappings = two_mappings(tmp.path());

    let store = MemoryStore::new();
    store.fail("create_folder", Some("bad"), "HTTP 403 Forbidden");

    let options = EngineOptions {
        on_mapping_error: MappingErrorPolicy::ContinueAndReport,
        ..common::no_retry()
    };
    let report = common::engine_with(&store, ExclusionSet::default(), options)
        .run(&mappings)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].local_root, tmp.path().join("bad"));
    assert!(report.failures[0].error.contains("HTTP 403 Forbidden"));
    assert_eq!(report.mappings.len(), 1);
    assert_eq!(store.tree(ROOT), set(["good/", "good/b.txt"]));
}

#[tokio::test]
async fn test_missing_local_root_is_a_local_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();

    let err = common::engine(&store)
        .run(&[common::mapping(&tmp.path().join("vanished"), "")])
        .await
        .unwrap_err();

    match err {
        SyncError::MappingFailed { source, .. } => {
            assert!(matches!(*source, SyncError::LocalIo { .. }), "{source}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.calls().is_empty());
}

// ============================================================================
// Remote failures
// ============================================================================

#[tokio::test]
async fn test_failed_delete_is_reported_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("keep.txt", "keep")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    let orphan = store.seed_file(root_id.as_str(), "orphan.txt", b"stale");
    store.fail("delete_node", Some(orphan.as_str()), "HTTP 403 Forbidden");

    let report = common::engine_with(&store, ExclusionSet::default(), common::no_retry())
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap();

    assert_eq!(report.mappings[0].delete_failures, 1);
    assert_eq!(report.mappings[0].nodes_deleted, 0);
    assert_eq!(report.mappings[0].files_updated, 1);
    assert!(store.tree(ROOT).contains("root/orphan.txt"));
}

#[tokio::test]
async fn test_listing_failure_aborts_the_mapping() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    store.fail("list_children", Some(root_id.as_str()), "HTTP 403 Forbidden");

    let err = common::engine_with(&store, ExclusionSet::default(), common::no_retry())
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    let chain = err.chain();
    assert!(chain.contains("list_children"), "{chain}");
    assert!(chain.contains(root_id.as_str()), "{chain}");
    assert_eq!(store.creates(), 0);
    assert_eq!(store.deletes(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a"), ("b.txt", "b")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    let b = store.seed_file(root_id.as_str(), "b.txt", b"old");
    store.fail_times("create_file", Some("a.txt"), "HTTP 429 Too Many Requests", 1);
    store.fail_times("update_file", Some(b.as_str()), "HTTP 503 Service Unavailable", 2);

    let report = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap();

    assert_eq!(store.creates(), 2);
    assert_eq!(store.updates(), 3);
    assert_eq!(store.tree(ROOT), set(["root/", "root/a.txt", "root/b.txt"]));
    assert_eq!(store.content(ROOT, "root/b.txt").unwrap(), b"b");
    assert_eq!(report.mappings[0].files_created, 1);
    assert_eq!(report.mappings[0].files_updated, 1);
}

#[tokio::test]
async fn test_timed_out_create_is_not_repeated() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a")]);

    let store = MemoryStore::new();
    store.seed_folder(ROOT, "root");
    store.fail_times("create_file", Some("a.txt"), "operation timed out", 1);

    let err = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    assert!(err.chain().contains("timed out"));
    assert_eq!(store.creates(), 1);
}

#[tokio::test]
async fn test_not_found_with_server_error_digits_is_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "new")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    let a = store.seed_file(root_id.as_str(), "a.txt", b"old");
    let message = "HTTP 404 Not Found: File not found: 1Zx500Qa";
    store.fail_times("update_file", Some(a.as_str()), message, 1);

    let err = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    assert!(err.chain().contains("1Zx500Qa"), "{}", err.chain());
    assert_eq!(store.updates(), 1);
}

#[tokio::test]
async fn test_tagged_permanent_error_is_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "new")]);

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    let a = store.seed_file(root_id.as_str(), "a.txt", b"old");
    store.fail_tagged(
        "update_file",
        Some(a.as_str()),
        RemoteErrorKind::Permanent,
        "upstream said: 503 Service Unavailable",
        1,
    );

    let err = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    assert!(err.chain().contains("upstream said"));
    assert_eq!(store.updates(), 1);
}

#[tokio::test]
async fn test_tagged_rate_limit_is_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a")]);

    let store = MemoryStore::new();
    store.seed_folder(ROOT, "root");
    store.fail_tagged("create_file", Some("a.txt"), RemoteErrorKind::RateLimited, "quota", 1);

    let report = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap();

    assert_eq!(store.creates(), 2);
    assert_eq!(report.mappings[0].files_created, 1);
}

#[tokio::test]
async fn test_retries_give_up_after_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("a.txt", "a")]);

    let store = MemoryStore::new();
    store.fail("find_child", Some("root"), "HTTP 502 Bad Gateway");

    let options = EngineOptions {
        retry: RetryPolicy::new(2, std::time::Duration::ZERO),
        ..EngineOptions::default()
    };
    let err = common::engine_with(&store, ExclusionSet::default(), options)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap_err();

    assert!(err.chain().contains("502"));
    assert_eq!(store.calls().len(), 3);
}

// ============================================================================
// Local entries that are not mirrored
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_skipped_and_their_remote_twin_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(&local, &[("real.txt", "real")]);
    std::os::unix::fs::symlink(local.join("real.txt"), local.join("link.txt")).unwrap();

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    store.seed_file(root_id.as_str(), "link.txt", b"uploaded by hand");

    let report = common::engine(&store)
        .run(&[common::mapping(&local, "")])
        .await
        .unwrap();

    assert_eq!(
        store.tree(ROOT),
        set(["root/", "root/link.txt", "root/real.txt"])
    );
    assert_eq!(store.content(ROOT, "root/link.txt").unwrap(), b"uploaded by hand");
    assert_eq!(report.mappings[0].entries_skipped, 1);
    assert_eq!(store.deletes(), 0);
}

// ============================================================================
// Dry run
// ============================================================================

#[tokio::test]
async fn test_dry_run_reports_without_mutating() {
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("root");
    common::write_tree(
        &local,
        &[("keep.txt", "keep"), ("new/inner.txt", "inner"), ("new/deeper/x.txt", "x")],
    );

    let store = MemoryStore::new();
    let root_id = store.seed_folder(ROOT, "root");
    store.seed_file(root_id.as_str(), "keep.txt", b"old");
    store.seed_file(root_id.as_str(), "orphan.txt", b"stale");
    let before = store.tree(ROOT);

    let dry_run: Arc<DryRunStore> = Arc::new(DryRunStore::new(store.clone()));
    let engine = ReconciliationEngine::new(
        dry_run,
        RemoteId::new(ROOT).unwrap(),
        ExclusionSet::default(),
        common::no_retry(),
    );
    let report = engine.run(&[common::mapping(&local, "")]).await.unwrap();

    assert_eq!(store.tree(ROOT), before);
    assert_eq!(store.creates(), 0);
    assert_eq!(store.updates(), 0);
    assert_eq!(store.deletes(), 0);

    let mapping = &report.mappings[0];
    assert_eq!(mapping.folders_created, 2);
    assert_eq!(mapping.files_created, 2);
    assert_eq!(mapping.files_updated, 1);
    assert_eq!(mapping.nodes_deleted, 1);
}
