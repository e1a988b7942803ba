//! Sync orchestrator: the core of the core. Runs the three-phase pipeline —
//! parallel hash + remote snapshot, stale deletion, streaming
//! chunk->embed->upsert — under strict concurrency and memory bounds, driven
//! by a single coordinating task that owns the accumulator.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::collection::resolve_effective_model;
use crate::config::AppConfig;
use crate::diff::{self, ScopeMode};
use crate::embedder::EmbeddingProvider;
use crate::error::{AppError, AppResult};
use crate::fingerprint::{self, ChunkHash, FileHash};
use crate::stats::SyncStats;
use crate::vector_store::{DataPayload, Point, PointPayload, ScrollFilter, VectorStoreAdapter};
use crate::walker::{self, WalkedFile};

const BATCH_RETRY_ATTEMPTS: u32 = 3;
const BATCH_RETRY_BASE: Duration = Duration::from_secs(2);

/// Cooperative cancellation signal propagated to every worker pool. A clone
/// is cheap; `cancel()` is visible to every clone immediately.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SyncRequest {
    pub root: PathBuf,
    pub mode: ScopeMode,
    pub scope_prefix: Option<String>,
    pub collection: String,
    pub embedding_model: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    ResolvingCollection,
    Hashing,
    Diffing,
    Deleting,
    Streaming,
    Draining,
    Done,
    Failed,
    Cancelled,
}

struct ChunkRecord {
    chunk_id: Uuid,
    index: usize,
    file_hash: FileHash,
    chunk_hash: ChunkHash,
    text: String,
    logical_path: String,
}

/// What a single chunking worker reports back for one file.
enum RawOutcome {
    Chunks { logical_path: String, records: Vec<ChunkRecord> },
    Skipped { logical_path: String },
    Error { logical_path: String, reason: String },
}

/// What the coordinator reports once a file's chunks have actually been
/// embedded and upserted (or it turned out empty / erroring).
enum ChunkingOutcome {
    Chunks { logical_path: String, chunk_count: usize },
    Skipped { logical_path: String },
    Error { logical_path: String, reason: String },
}

/// Runs one full sync. Generic over the vector-store adapter, embedding
/// provider, and chunker so callers can substitute fakes in tests without a
/// trait-object / dyn-compatibility tax.
pub async fn sync<V, E, C>(
    adapter: &V,
    embedder: &E,
    chunker: &C,
    config: &AppConfig,
    request: SyncRequest,
    cancel: CancellationToken,
) -> AppResult<SyncStats>
where
    V: VectorStoreAdapter,
    E: EmbeddingProvider,
    C: Chunker,
{
    let mut state = SyncState::Init;
    let mut stats = SyncStats::default();

    // --- ResolvingCollection ---
    state = SyncState::ResolvingCollection;
    info!(?state, collection = %request.collection, "resolving collection");

    // `embedder` was already constructed by the caller; the only way this
    // sync can be correct is if it was built against the model the
    // collection is actually bound to. Recompute that binding here and
    // refuse to proceed on a mismatch rather than silently embedding with
    // the wrong model/dimensionality.
    let effective_model = resolve_effective_model(adapter, &request.collection, &request.embedding_model).await?;
    if effective_model != request.embedding_model {
        return Err(AppError::ModelMismatch {
            requested: request.embedding_model.clone(),
            bound: effective_model,
        });
    }

    // --- Hashing + Scrolling (concurrently) ---
    state = SyncState::Hashing;
    info!(?state, "walking source and hashing files");

    let walked = walker::walk(&request.root, request.mode, request.scope_prefix.as_deref())?;
    let walked_for_hash = walked.clone();
    let hasher_workers = config.hasher_workers;

    let (hash_result, remote_result) = tokio::join!(
        tokio::task::spawn_blocking(move || hash_files_parallel(&walked_for_hash, hasher_workers)),
        scroll_remote_snapshot(adapter, &request.collection, request.mode, request.scope_prefix.as_deref())
    );

    let (local, hash_errors) = hash_result.map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    stats.errors.extend(hash_errors);
    let (remote, remote_chunk_counts) = remote_result?;

    // --- Diffing ---
    state = SyncState::Diffing;
    let partition = diff::diff(&local, &remote, request.mode);
    info!(
        ?state,
        new = partition.new.len(),
        modified = partition.modified.len(),
        unchanged = partition.unchanged.len(),
        deleted = partition.deleted.len(),
        "diff complete"
    );

    for path in &partition.unchanged {
        let chunk_count = remote_chunk_counts.get(path).copied().unwrap_or(0);
        stats.unchanged.push((path.clone(), chunk_count));
    }

    // --- Deleting stale versions ---
    state = SyncState::Deleting;
    let stale: Vec<String> = partition
        .modified
        .iter()
        .chain(partition.deleted.iter())
        .cloned()
        .collect();
    delete_stale(adapter, &request.collection, &stale, config.delete_batch).await?;

    for path in &partition.deleted {
        let chunk_count = remote_chunk_counts.get(path).copied().unwrap_or(0);
        stats.deleted.push((path.clone(), chunk_count));
    }

    // --- Streaming chunk -> embed -> upsert ---
    state = SyncState::Streaming;
    // Carry each file's Phase 1 hash straight into the chunking workers:
    // re-hashing here would cost a second read per file and risk the
    // Phase-1 and Phase-3 hashes disagreeing if the file changed in between.
    let to_process: Vec<(WalkedFile, FileHash)> = walked
        .into_iter()
        .filter(|f| partition.new.contains(&f.logical_path) || partition.modified.contains(&f.logical_path))
        .filter_map(|f| {
            let hash = local.get(&f.logical_path).cloned()?;
            Some((f, hash))
        })
        .collect();

    let new_set: HashSet<&String> = partition.new.iter().collect();
    let modified_set: HashSet<&String> = partition.modified.iter().collect();

    let outcomes = run_chunk_embed_upsert(
        adapter,
        embedder,
        chunker,
        &request.collection,
        to_process,
        config,
        cancel.clone(),
    )
    .await?;

    if cancel.is_cancelled() {
        state = SyncState::Cancelled;
        info!(?state, "sync cancelled, skipping final classification");
        return Err(AppError::Cancelled);
    }

    state = SyncState::Draining;
    for outcome in outcomes {
        match outcome {
            ChunkingOutcome::Chunks { logical_path, chunk_count } => {
                if new_set.contains(&logical_path) {
                    stats.added.push((logical_path, chunk_count));
                } else if modified_set.contains(&logical_path) {
                    stats.modified.push((logical_path, chunk_count));
                }
            }
            ChunkingOutcome::Skipped { logical_path } => stats.skipped.push(logical_path),
            ChunkingOutcome::Error { logical_path, reason } => stats.errors.push((logical_path, reason)),
        }
    }

    state = SyncState::Done;
    info!(?state, "sync complete");
    Ok(stats)
}

fn hash_files_parallel(
    walked: &[WalkedFile],
    _workers: usize,
) -> (BTreeMap<String, FileHash>, Vec<(String, String)>) {
    // Rayon's global pool already sizes itself to available cores; the
    // configured worker count is advisory. Runs inside `spawn_blocking`, so
    // errors are returned rather than written through a `&mut SyncStats`
    // that couldn't survive the move onto the blocking thread.
    let results: Vec<(String, Result<FileHash, String>)> = walked
        .par_iter()
        .map(|f| {
            let hash = fingerprint::hash_file(&f.abs_path).map_err(|e| e.to_string());
            (f.logical_path.clone(), hash)
        })
        .collect();

    let mut local = BTreeMap::new();
    let mut errors = Vec::new();
    for (logical_path, result) in results {
        match result {
            Ok(hash) => {
                local.insert(logical_path, hash);
            }
            Err(err) => errors.push((logical_path, err)),
        }
    }
    (local, errors)
}

/// Builds the remote `{logical_path -> FileHash}` snapshot used for diffing,
/// plus a `{logical_path -> point count}` side table so unchanged/deleted
/// files can report their actual chunk count without a second remote round
/// trip.
async fn scroll_remote_snapshot<V: VectorStoreAdapter>(
    adapter: &V,
    collection: &str,
    mode: ScopeMode,
    scope_prefix: Option<&str>,
) -> AppResult<(BTreeMap<String, FileHash>, HashMap<String, usize>)> {
    let mut remote = BTreeMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    crate::vector_store::scroll_all(adapter, collection, ScrollFilter::None, 1000, |points| {
        for point in points {
            if crate::vector_store::is_metadata_point(&point.id) {
                continue;
            }
            if let Some(data) = point.payload.as_data() {
                if mode == ScopeMode::PrefixScoped {
                    if let Some(prefix) = scope_prefix {
                        if !data.file_path.starts_with(prefix) {
                            continue;
                        }
                    }
                }
                remote.insert(data.file_path.clone(), data.parent_file_hash.clone());
                *counts.entry(data.file_path.clone()).or_insert(0) += 1;
            }
        }
    })
    .await?;
    Ok((remote, counts))
}

async fn delete_stale<V: VectorStoreAdapter>(
    adapter: &V,
    collection: &str,
    paths: &[String],
    delete_batch: usize,
) -> AppResult<()> {
    let mut ids = Vec::new();
    for path in paths {
        crate::vector_store::scroll_all(
            adapter,
            collection,
            ScrollFilter::FilePathEquals(path.clone()),
            1000,
            |points| ids.extend(points.into_iter().map(|p| p.id)),
        )
        .await?;
    }

    for batch in ids.chunks(delete_batch) {
        adapter.delete_points(collection, batch.to_vec()).await?;
    }
    Ok(())
}

async fn run_chunk_embed_upsert<V, E, C>(
    adapter: &V,
    embedder: &E,
    chunker: &C,
    collection: &str,
    files: Vec<(WalkedFile, FileHash)>,
    config: &AppConfig,
    cancel: CancellationToken,
) -> AppResult<Vec<ChunkingOutcome>>
where
    V: VectorStoreAdapter,
    E: EmbeddingProvider,
    C: Chunker,
{
    let queue: Arc<Mutex<VecDeque<(WalkedFile, FileHash)>>> = Arc::new(Mutex::new(files.into_iter().collect()));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<RawOutcome>(config.max_pending.max(1));

    let worker_count = config.chunker_workers.max(1);
    let mut handles = Vec::with_capacity(worker_count);

    for _ in 0..worker_count {
        let queue = queue.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        // `Chunker` isn't `'static` here, so chunking runs inline on the
        // worker task rather than via `spawn_blocking`; callers that need a
        // truly CPU-isolated pool can wrap their `Chunker` in an `Arc` and
        // spawn accordingly.
        handles.push(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = queue.lock().pop_front();
                let Some((file, file_hash)) = next else { break };

                // `file_hash` is the Phase 1 hash already computed for this
                // file; re-hashing here would double the I/O and risk
                // disagreeing with it if the file changed in between.
                let outcome = match std::fs::read_to_string(&file.abs_path) {
                    Ok(content) => {
                        let pieces = chunker.chunk(&content);
                        if pieces.is_empty() {
                            RawOutcome::Skipped {
                                logical_path: file.logical_path,
                            }
                        } else {
                            let records = pieces
                                .into_iter()
                                .enumerate()
                                .map(|(index, text)| {
                                    let chunk_hash = fingerprint::hash_text(&text);
                                    let chunk_id = fingerprint::chunk_id(&file_hash, index);
                                    ChunkRecord {
                                        chunk_id,
                                        index,
                                        file_hash: file_hash.clone(),
                                        chunk_hash,
                                        text,
                                        logical_path: file.logical_path.clone(),
                                    }
                                })
                                .collect();
                            RawOutcome::Chunks {
                                logical_path: file.logical_path,
                                records,
                            }
                        }
                    }
                    Err(err) => RawOutcome::Error {
                        logical_path: file.logical_path,
                        reason: err.to_string(),
                    },
                };

                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let worker_set = futures_util::future::join_all(handles);

    // Single coordinator: owns the accumulator, so no lock is needed on it.
    let mut outcomes = Vec::new();
    let mut accumulator: Vec<ChunkRecord> = Vec::new();
    let mut pending_counts: Vec<(String, usize)> = Vec::new();

    while let Some(outcome) = rx.recv().await {
        if cancel.is_cancelled() {
            continue;
        }
        match outcome {
            RawOutcome::Chunks { logical_path, records } => {
                pending_counts.push((logical_path, records.len()));
                accumulator.extend(records);
            }
            RawOutcome::Skipped { logical_path } => outcomes.push(ChunkingOutcome::Skipped { logical_path }),
            RawOutcome::Error { logical_path, reason } => {
                outcomes.push(ChunkingOutcome::Error { logical_path, reason })
            }
        }

        if accumulator.len() >= config.upload_threshold && !cancel.is_cancelled() {
            flush_accumulator(adapter, embedder, &mut accumulator, config.embed_batch, config.upsert_batch, collection)
                .await?;
            drain_pending_counts(&mut pending_counts, &mut outcomes);
        }
    }

    worker_set.await;

    if !cancel.is_cancelled() {
        flush_accumulator(adapter, embedder, &mut accumulator, config.embed_batch, config.upsert_batch, collection)
            .await?;
        drain_pending_counts(&mut pending_counts, &mut outcomes);
    } else {
        warn!(
            "cancellation requested: skipping final flush, {} chunks not upserted",
            accumulator.len()
        );
    }

    Ok(outcomes)
}

/// Moves every `(logical_path, chunk_count)` pair accumulated since the last
/// flush into the final outcomes list. Called only right after a successful
/// flush, so every pending file's chunks are now durably upserted.
fn drain_pending_counts(pending_counts: &mut Vec<(String, usize)>, outcomes: &mut Vec<ChunkingOutcome>) {
    for (logical_path, chunk_count) in pending_counts.drain(..) {
        outcomes.push(ChunkingOutcome::Chunks { logical_path, chunk_count });
    }
}

async fn flush_accumulator<V: VectorStoreAdapter, E: EmbeddingProvider>(
    adapter: &V,
    embedder: &E,
    accumulator: &mut Vec<ChunkRecord>,
    embed_batch: usize,
    upsert_batch: usize,
    collection: &str,
) -> AppResult<()> {
    if accumulator.is_empty() {
        return Ok(());
    }
    let records = std::mem::take(accumulator);
    let mut points = Vec::with_capacity(records.len());

    for batch in records.chunks(embed_batch) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (record, vector) in batch.iter().zip(vectors) {
            points.push(Point {
                id: record.chunk_id,
                vector,
                payload: PointPayload::Data(DataPayload {
                    file_path: record.logical_path.clone(),
                    parent_file_hash: record.file_hash.clone(),
                    chunk_hash: record.chunk_hash.clone(),
                    text: record.text.clone(),
                }),
            });
        }
    }

    for batch in points.chunks(upsert_batch) {
        upsert_with_retry(adapter, collection, batch.to_vec()).await?;
    }
    Ok(())
}

async fn upsert_with_retry<V: VectorStoreAdapter>(adapter: &V, collection: &str, batch: Vec<Point>) -> AppResult<()> {
    let mut last_err = None;
    for attempt in 0..BATCH_RETRY_ATTEMPTS {
        match adapter.upsert(collection, batch.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!("upsert batch failed (attempt {}/{}): {err}", attempt + 1, BATCH_RETRY_ATTEMPTS);
                last_err = Some(err);
                if attempt + 1 < BATCH_RETRY_ATTEMPTS {
                    tokio::time::sleep(BATCH_RETRY_BASE * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::UpsertFailed("exhausted retries".into())))
}
