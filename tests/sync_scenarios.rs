//! End-to-end scenario tests for the sync orchestrator, run against the
//! in-memory fakes in `tests/common`.

mod common;

use std::time::Duration;

use common::{test_config, write_file, FakeEmbedder, FakeVectorStore};
use ragsync::chunker::LineWindowChunker;
use ragsync::collection;
use ragsync::diff::ScopeMode;
use ragsync::error::AppError;
use ragsync::orchestrator::{self, CancellationToken, SyncRequest};
use ragsync::vector_store::Distance;

const DIM: usize = 4;
const MODEL: &str = "fake-model";

fn request(root: &std::path::Path, prefix: &str, collection: &str) -> SyncRequest {
    SyncRequest {
        root: root.to_path_buf(),
        mode: ScopeMode::PrefixScoped,
        scope_prefix: Some(prefix.to_string()),
        collection: collection.to_string(),
        embedding_model: MODEL.to_string(),
        api_token: "unused".to_string(),
    }
}

async fn new_collection(adapter: &FakeVectorStore, name: &str) {
    collection::create_collection(adapter, name, DIM, MODEL, Distance::Cosine)
        .await
        .unwrap();
}

#[tokio::test]
async fn s1_first_sync_of_three_file_repo() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", "hello");
    write_file(dir.path(), "b.txt", "world");
    write_file(dir.path(), "c.txt", "");

    let adapter = FakeVectorStore::new();
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let config = test_config();

    new_collection(&adapter, "docs").await;

    let stats = orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let mut added = stats.added.clone();
    added.sort();
    assert_eq!(
        added,
        vec![("repo/a.txt".to_string(), 1), ("repo/b.txt".to_string(), 1)]
    );
    assert_eq!(stats.skipped, vec!["repo/c.txt".to_string()]);
    assert!(stats.modified.is_empty());
    assert!(stats.deleted.is_empty());
    assert!(stats.errors.is_empty());

    // two data points plus the reserved metadata point
    assert_eq!(adapter.point_count("docs"), 3);
}

#[tokio::test]
async fn s2_resync_unchanged_issues_no_upserts() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", "hello");
    write_file(dir.path(), "b.txt", "world");

    let adapter = FakeVectorStore::new();
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let config = test_config();

    new_collection(&adapter, "docs").await;

    orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let count_after_first = adapter.point_count("docs");

    let stats = orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let mut unchanged = stats.unchanged.clone();
    unchanged.sort();
    assert_eq!(
        unchanged,
        vec![("repo/a.txt".to_string(), 1), ("repo/b.txt".to_string(), 1)]
    );
    assert!(stats.added.is_empty());
    assert!(stats.modified.is_empty());
    assert!(stats.deleted.is_empty());
    assert_eq!(adapter.point_count("docs"), count_after_first);
}

#[tokio::test]
async fn s3_modify_one_file_replaces_its_point_and_leaves_the_other() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", "hello");
    write_file(dir.path(), "b.txt", "world");

    let adapter = FakeVectorStore::new();
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let config = test_config();

    new_collection(&adapter, "docs").await;

    orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    write_file(dir.path(), "a.txt", "HELLO");

    let stats = orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.modified, vec![("repo/a.txt".to_string(), 1)]);
    assert_eq!(stats.unchanged, vec![("repo/b.txt".to_string(), 1)]);
    assert!(stats.added.is_empty());
    assert!(stats.deleted.is_empty());

    // still one point for a.txt, one for b.txt, plus the metadata point
    assert_eq!(adapter.point_count("docs"), 3);
}

#[tokio::test]
async fn s4_delete_one_file_in_prefix_scoped_mode() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", "hello");
    write_file(dir.path(), "b.txt", "world");

    let adapter = FakeVectorStore::new();
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let config = test_config();

    new_collection(&adapter, "docs").await;

    orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    std::fs::remove_file(dir.path().join("b.txt")).unwrap();

    let stats = orchestrator::sync(
        &adapter,
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.deleted, vec![("repo/b.txt".to_string(), 1)]);
    assert_eq!(stats.unchanged, vec![("repo/a.txt".to_string(), 1)]);
    assert!(stats.added.is_empty());
    assert!(stats.modified.is_empty());

    // a.txt's point plus the metadata point; b.txt's point is gone
    assert_eq!(adapter.point_count("docs"), 2);
}

#[tokio::test]
async fn s5_flat_archive_add_never_deletes_existing_points() {
    let adapter = FakeVectorStore::new();
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let config = test_config();

    new_collection(&adapter, "docs").await;
    // Seed the collection as though an earlier flat sync had already
    // uploaded c.txt; flat mode has no remote scope prefix to match
    // against, so every existing data point counts as "already there".
    adapter.seed_data_point("docs", uuid::Uuid::new_v4(), "c.txt", "deadbeef");

    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", "hello");
    write_file(dir.path(), "b.txt", "world");

    let flat_request = SyncRequest {
        root: dir.path().to_path_buf(),
        mode: ScopeMode::Flat,
        scope_prefix: None,
        collection: "docs".to_string(),
        embedding_model: MODEL.to_string(),
        api_token: "unused".to_string(),
    };

    let stats = orchestrator::sync(&adapter, &embedder, &chunker, &config, flat_request, CancellationToken::new())
        .await
        .unwrap();

    let mut added = stats.added.clone();
    added.sort();
    assert_eq!(added, vec![("a.txt".to_string(), 1), ("b.txt".to_string(), 1)]);
    assert!(stats.deleted.is_empty(), "flat mode must never infer deletions");

    // c.txt (seeded) + a.txt + b.txt + the metadata point
    assert_eq!(adapter.point_count("docs"), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s6_mid_run_cancellation_then_a_convergent_follow_up_sync() {
    const TOTAL_FILES: usize = 1000;
    const CANCEL_AFTER_POINTS: usize = 100;

    let dir = tempfile::tempdir().unwrap();
    for i in 0..TOTAL_FILES {
        write_file(dir.path(), &format!("file_{i:04}.txt"), &format!("contents of file {i}"));
    }

    let adapter = std::sync::Arc::new(FakeVectorStore::new());
    let embedder = FakeEmbedder::new(DIM);
    let chunker = LineWindowChunker::default();
    let mut config = test_config();
    config.chunker_workers = 1;
    config.max_pending = 2;
    config.upload_threshold = 8;

    new_collection(&adapter, "docs").await;

    let cancel = CancellationToken::new();
    let canceller_adapter = adapter.clone();
    let canceller_cancel = cancel.clone();
    let canceller = tokio::spawn(async move {
        loop {
            if canceller_adapter.point_count("docs") >= CANCEL_AFTER_POINTS {
                canceller_cancel.cancel();
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let result = orchestrator::sync(
        adapter.as_ref(),
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        cancel,
    )
    .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(AppError::Cancelled)));
    let partial_count = adapter.point_count("docs");
    // More than just the metadata point, but short of every file: some
    // batches were flushed before cancellation, the rest were interrupted.
    assert!(partial_count > 1, "cancellation should have let some points through");
    assert!(
        partial_count < TOTAL_FILES + 1,
        "cancellation should have interrupted before every file streamed"
    );

    // Follow-up sync, uncancelled: must converge to the full set, splitting
    // files already-upserted-before-cancellation as unchanged from the rest
    // as new.
    let stats = orchestrator::sync(
        adapter.as_ref(),
        &embedder,
        &chunker,
        &config,
        request(dir.path(), "repo/", "docs"),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.unchanged.len() + stats.added.len(), TOTAL_FILES);
    assert!(stats.modified.is_empty());
    assert!(stats.deleted.is_empty());
    // +1 for the metadata point
    assert_eq!(adapter.point_count("docs"), TOTAL_FILES + 1);
}
