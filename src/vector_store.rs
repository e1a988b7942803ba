//! Vector-store adapter: typed operations over a remote vector collection.
//! The core does not own the wire protocol; this module ships one HTTP
//! implementation against a Qdrant-shaped REST API, but the trait is the
//! actual contract callers depend on.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::fingerprint::metadata_point_id;

const UPSERT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Distance {
    Cosine,
    Euclid,
    Dot,
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distance::Cosine => write!(f, "Cosine"),
            Distance::Euclid => write!(f, "Euclid"),
            Distance::Dot => write!(f, "Dot"),
        }
    }
}

/// Tagged payload record: a collection's metadata point is a distinct
/// variant so it can never be mistaken for a data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointPayload {
    Metadata(MetadataPayload),
    Data(DataPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataPayload {
    #[serde(rename = "_collection_metadata")]
    pub is_collection_metadata: bool,
    pub embedding_model: String,
    pub vector_size: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPayload {
    pub file_path: String,
    pub parent_file_hash: String,
    pub chunk_hash: String,
    pub text: String,
}

impl PointPayload {
    pub fn is_metadata(&self) -> bool {
        matches!(self, PointPayload::Metadata(_))
    }

    pub fn as_data(&self) -> Option<&DataPayload> {
        match self {
            PointPayload::Data(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Server-side filter. Only exact-match on `file_path` is pushed down;
/// prefix matching is always done client-side, since Qdrant has no native
/// prefix filter.
#[derive(Debug, Clone)]
pub enum ScrollFilter {
    None,
    FilePathEquals(String),
}

pub struct ScrollPage {
    pub points: Vec<Point>,
    pub next_offset: Option<Uuid>,
}

/// Required operations over a remote vector collection. Semantic, not
/// wire-level: an implementation over a store with native prefix filtering
/// may optimise `scroll` while preserving this contract.
pub trait VectorStoreAdapter: Send + Sync {
    fn create_collection(
        &self,
        name: &str,
        dim: usize,
        distance: Distance,
    ) -> impl std::future::Future<Output = AppResult<()>> + Send;

    fn delete_collection(&self, name: &str) -> impl std::future::Future<Output = AppResult<()>> + Send;

    fn exists(&self, name: &str) -> impl std::future::Future<Output = AppResult<bool>> + Send;

    fn upsert(
        &self,
        name: &str,
        points: Vec<Point>,
    ) -> impl std::future::Future<Output = AppResult<()>> + Send;

    fn delete_points(
        &self,
        name: &str,
        ids: Vec<Uuid>,
    ) -> impl std::future::Future<Output = AppResult<()>> + Send;

    fn retrieve(
        &self,
        name: &str,
        ids: Vec<Uuid>,
    ) -> impl std::future::Future<Output = AppResult<Vec<Point>>> + Send;

    /// Single page of a scroll. `with_vectors` is always false for core
    /// callers (diff only needs id + two payload fields); vectors are
    /// returned only when an adapter implementation genuinely needs them.
    fn scroll_page(
        &self,
        name: &str,
        filter: ScrollFilter,
        with_vectors: bool,
        offset: Option<Uuid>,
        page_size: usize,
    ) -> impl std::future::Future<Output = AppResult<ScrollPage>> + Send;

    fn count(&self, name: &str) -> impl std::future::Future<Output = AppResult<usize>> + Send;
}

/// Pages through an entire collection (optionally server-filtered), calling
/// `on_page` for each page, until the cursor is exhausted. This is the
/// "single pass, no per-file remote lookup" scroll used in Phase 1.
pub async fn scroll_all<V: VectorStoreAdapter>(
    adapter: &V,
    name: &str,
    filter: ScrollFilter,
    page_size: usize,
    mut on_page: impl FnMut(Vec<Point>),
) -> AppResult<()> {
    let mut offset = None;
    loop {
        let page = adapter
            .scroll_page(name, filter.clone(), false, offset, page_size)
            .await?;
        let done = page.next_offset.is_none();
        on_page(page.points);
        if done {
            break;
        }
        offset = page.next_offset;
    }
    Ok(())
}

impl Clone for ScrollFilter {
    fn clone(&self) -> Self {
        match self {
            ScrollFilter::None => ScrollFilter::None,
            ScrollFilter::FilePathEquals(s) => ScrollFilter::FilePathEquals(s.clone()),
        }
    }
}

/// HTTP adapter against a Qdrant-shaped REST API.
pub struct QdrantHttpAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantHttpAdapter {
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPSERT_TIMEOUT)
            .build()
            .map_err(AppError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Serialize)]
struct CreateCollectionBody {
    vectors: VectorsConfig,
}

#[derive(Serialize)]
struct VectorsConfig {
    size: usize,
    distance: Distance,
}

#[derive(Serialize)]
struct UpsertBody {
    points: Vec<WirePoint>,
}

#[derive(Serialize)]
struct WirePoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: PointPayload,
}

#[derive(Serialize)]
struct DeletePointsBody {
    points: Vec<Uuid>,
}

#[derive(Serialize)]
struct RetrieveBody {
    ids: Vec<Uuid>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Serialize)]
struct ScrollBody {
    limit: usize,
    offset: Option<Uuid>,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireResult<T> {
    result: T,
}

#[derive(Deserialize)]
struct RetrievedPoint {
    id: Uuid,
    #[serde(default)]
    vector: Vec<f32>,
    payload: PointPayload,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<RetrievedPoint>,
    next_page_offset: Option<Uuid>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct ListCollectionsResult {
    collections: Vec<CollectionDescription>,
}

impl QdrantHttpAdapter {
    /// Enumerates every collection on the store. Not part of
    /// `VectorStoreAdapter` (no store-agnostic contract requires it) — the
    /// CLI's `collections list` uses this directly against the concrete
    /// adapter.
    pub async fn list_collections(&self) -> AppResult<Vec<String>> {
        let resp = self.client.get(self.url("/collections")).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "list_collections failed: {}",
                resp.status()
            )));
        }
        let wire: WireResult<ListCollectionsResult> = resp.json().await?;
        Ok(wire.result.collections.into_iter().map(|c| c.name).collect())
    }
}

impl VectorStoreAdapter for QdrantHttpAdapter {
    async fn create_collection(&self, name: &str, dim: usize, distance: Distance) -> AppResult<()> {
        if self.exists(name).await? {
            return Err(AppError::VectorStore(format!("collection '{name}' already exists")));
        }
        let body = CreateCollectionBody {
            vectors: VectorsConfig { size: dim, distance },
        };
        let resp = self
            .client
            .put(self.url(&format!("/collections/{name}")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "create_collection({name}) failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> AppResult<()> {
        if !self.exists(name).await? {
            return Err(AppError::CollectionNotFound(name.to_string()));
        }
        let resp = self
            .client
            .delete(self.url(&format!("/collections/{name}")))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "delete_collection({name}) failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> AppResult<bool> {
        let resp = self
            .client
            .get(self.url(&format!("/collections/{name}")))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> AppResult<()> {
        let body = UpsertBody {
            points: points
                .into_iter()
                .map(|p| WirePoint {
                    id: p.id,
                    vector: p.vector,
                    payload: p.payload,
                })
                .collect(),
        };
        let resp = self
            .client
            .put(self.url(&format!("/collections/{name}/points?wait=true")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::UpsertFailed(format!(
                "upsert into '{name}' failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_points(&self, name: &str, ids: Vec<Uuid>) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = DeletePointsBody { points: ids };
        let resp = self
            .client
            .post(self.url(&format!("/collections/{name}/points/delete?wait=true")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "delete_points from '{name}' failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn retrieve(&self, name: &str, ids: Vec<Uuid>) -> AppResult<Vec<Point>> {
        let body = RetrieveBody {
            ids,
            with_payload: true,
            with_vector: true,
        };
        let resp = self
            .client
            .post(self.url(&format!("/collections/{name}/points")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "retrieve from '{name}' failed: {}",
                resp.status()
            )));
        }
        let wire: WireResult<Vec<RetrievedPoint>> = resp.json().await?;
        Ok(wire
            .result
            .into_iter()
            .map(|p| Point {
                id: p.id,
                vector: p.vector,
                payload: p.payload,
            })
            .collect())
    }

    async fn scroll_page(
        &self,
        name: &str,
        filter: ScrollFilter,
        with_vectors: bool,
        offset: Option<Uuid>,
        page_size: usize,
    ) -> AppResult<ScrollPage> {
        let filter_json = match filter {
            ScrollFilter::None => None,
            ScrollFilter::FilePathEquals(path) => Some(serde_json::json!({
                "must": [{ "key": "file_path", "match": { "value": path } }]
            })),
        };
        let body = ScrollBody {
            limit: page_size,
            offset,
            with_payload: true,
            with_vector: with_vectors,
            filter: filter_json,
        };
        let resp = self
            .client
            .post(self.url(&format!("/collections/{name}/points/scroll")))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "scroll over '{name}' failed: {}",
                resp.status()
            )));
        }
        let wire: WireResult<ScrollResult> = resp.json().await?;
        Ok(ScrollPage {
            points: wire
                .result
                .points
                .into_iter()
                .map(|p| Point {
                    id: p.id,
                    vector: p.vector,
                    payload: p.payload,
                })
                .collect(),
            next_offset: wire.result.next_page_offset,
        })
    }

    async fn count(&self, name: &str) -> AppResult<usize> {
        let resp = self
            .client
            .post(self.url(&format!("/collections/{name}/points/count")))
            .json(&serde_json::json!({ "exact": true }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::VectorStore(format!(
                "count over '{name}' failed: {}",
                resp.status()
            )));
        }
        let wire: WireResult<CountResult> = resp.json().await?;
        Ok(wire.result.count)
    }
}

/// True for the reserved all-zeros metadata point id; used by callers that
/// must exclude it from diff/data scans.
pub fn is_metadata_point(id: &Uuid) -> bool {
    *id == metadata_point_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_point_is_excluded_by_id() {
        assert!(is_metadata_point(&metadata_point_id()));
        assert!(!is_metadata_point(&Uuid::new_v4()));
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let data = PointPayload::Data(DataPayload {
            file_path: "repo/a.txt".into(),
            parent_file_hash: "abc".into(),
            chunk_hash: "def".into(),
            text: "hello".into(),
        });
        let json = serde_json::to_string(&data).unwrap();
        let back: PointPayload = serde_json::from_str(&json).unwrap();
        assert!(!back.is_metadata());
        assert_eq!(back.as_data().unwrap().file_path, "repo/a.txt");
    }
}
