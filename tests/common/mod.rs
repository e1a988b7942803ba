//! In-memory fakes for `VectorStoreAdapter` and `EmbeddingProvider`, shared
//! across the scenario tests in `sync_scenarios.rs`.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use uuid::Uuid;

use ragsync::config::AppConfig;
use ragsync::embedder::EmbeddingProvider;
use ragsync::error::{AppError, AppResult};
use ragsync::vector_store::{DataPayload, Distance, Point, PointPayload, ScrollFilter, ScrollPage, VectorStoreAdapter};

struct CollectionState {
    points: BTreeMap<Uuid, Point>,
}

/// A whole vector store, held in memory. Scroll pagination and the
/// file-path-equals filter are implemented for real so the orchestrator's
/// scroll loop and stale-deletion pass exercise the same code paths they
/// would against a live store.
#[derive(Default)]
pub struct FakeVectorStore {
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl FakeVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections.lock().get(name).map(|c| c.points.len()).unwrap_or(0)
    }

    /// Test-only seeding hook, used to pre-populate a collection with a data
    /// point without going through a sync.
    pub fn seed_data_point(&self, name: &str, id: Uuid, file_path: &str, file_hash: &str) {
        let mut guard = self.collections.lock();
        let state = guard.get_mut(name).expect("collection must exist before seeding");
        state.points.insert(
            id,
            Point {
                id,
                vector: vec![0.0; 4],
                payload: PointPayload::Data(DataPayload {
                    file_path: file_path.to_string(),
                    parent_file_hash: file_hash.to_string(),
                    chunk_hash: "seed".to_string(),
                    text: "seed".to_string(),
                }),
            },
        );
    }
}

fn matches_filter(point: &Point, filter: &ScrollFilter) -> bool {
    match filter {
        ScrollFilter::None => true,
        ScrollFilter::FilePathEquals(path) => point.payload.as_data().map(|d| d.file_path == *path).unwrap_or(false),
    }
}

impl VectorStoreAdapter for FakeVectorStore {
    async fn create_collection(&self, name: &str, _dim: usize, _distance: Distance) -> AppResult<()> {
        let mut guard = self.collections.lock();
        if guard.contains_key(name) {
            return Err(AppError::VectorStore(format!("collection '{name}' already exists")));
        }
        guard.insert(name.to_string(), CollectionState { points: BTreeMap::new() });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> AppResult<()> {
        let mut guard = self.collections.lock();
        guard
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> AppResult<bool> {
        Ok(self.collections.lock().contains_key(name))
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> AppResult<()> {
        let mut guard = self.collections.lock();
        let state = guard
            .get_mut(name)
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))?;
        for point in points {
            state.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn delete_points(&self, name: &str, ids: Vec<Uuid>) -> AppResult<()> {
        let mut guard = self.collections.lock();
        let state = guard
            .get_mut(name)
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))?;
        for id in ids {
            state.points.remove(&id);
        }
        Ok(())
    }

    async fn retrieve(&self, name: &str, ids: Vec<Uuid>) -> AppResult<Vec<Point>> {
        let guard = self.collections.lock();
        let state = guard
            .get(name)
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))?;
        Ok(ids.into_iter().filter_map(|id| state.points.get(&id).cloned()).collect())
    }

    async fn scroll_page(
        &self,
        name: &str,
        filter: ScrollFilter,
        _with_vectors: bool,
        offset: Option<Uuid>,
        page_size: usize,
    ) -> AppResult<ScrollPage> {
        let guard = self.collections.lock();
        let state = guard
            .get(name)
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))?;

        let matching: Vec<Point> = state
            .points
            .values()
            .filter(|p| matches_filter(p, &filter))
            .cloned()
            .collect();

        let start = match offset {
            Some(cursor) => matching.iter().position(|p| p.id == cursor).unwrap_or(matching.len()),
            None => 0,
        };
        let end = (start + page_size).min(matching.len());
        let next_offset = if end < matching.len() { Some(matching[end].id) } else { None };

        Ok(ScrollPage {
            points: matching[start..end].to_vec(),
            next_offset,
        })
    }

    async fn count(&self, name: &str) -> AppResult<usize> {
        let guard = self.collections.lock();
        let state = guard
            .get(name)
            .ok_or_else(|| AppError::CollectionNotFound(name.to_string()))?;
        Ok(state.points.len())
    }
}

/// Returns a fixed-size zero vector per input text; scenario tests only
/// assert on `SyncStats`/collection membership, never on vector values.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dim]).collect())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        vector_store_url: "http://unused.invalid".to_string(),
        embed_api_token: None,
        hasher_workers: 2,
        chunker_workers: 2,
        max_pending: 8,
        upload_threshold: 4,
        embed_batch: 4,
        upsert_batch: 4,
        delete_batch: 4,
        job_timeout_secs: 60,
        data_dir: "/tmp/ragsync-test".to_string(),
    }
}

pub fn write_file(dir: &std::path::Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
