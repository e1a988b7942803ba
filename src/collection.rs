//! Collection manager: collection lifecycle and the embedding-model binding
//! carried in the metadata point.

use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::fingerprint::metadata_point_id;
use crate::vector_store::{Distance, MetadataPayload, Point, PointPayload, VectorStoreAdapter};

/// Creates a collection, then immediately upserts the metadata point. Both
/// steps must succeed; if the metadata upsert fails, the collection is
/// deleted to avoid leaving it in an ambiguous, half-bound state.
pub async fn create_collection<V: VectorStoreAdapter>(
    adapter: &V,
    name: &str,
    dim: usize,
    embedding_model: &str,
    distance: Distance,
) -> AppResult<()> {
    adapter.create_collection(name, dim, distance).await?;

    let metadata_point = Point {
        id: metadata_point_id(),
        vector: vec![0.0; dim],
        payload: PointPayload::Metadata(MetadataPayload {
            is_collection_metadata: true,
            embedding_model: embedding_model.to_string(),
            vector_size: dim,
            distance,
        }),
    };

    if let Err(err) = adapter.upsert(name, vec![metadata_point]).await {
        warn!("failed to upsert metadata point for '{name}', rolling back collection: {err}");
        let _ = adapter.delete_collection(name).await;
        return Err(err);
    }

    Ok(())
}

/// A collection's bound embedding model, if any. `Unbound` is legal: the
/// caller must then supply a model explicitly, and the core issues a
/// warning.
pub enum ModelBinding {
    Bound { model: String, vector_size: usize, distance: Distance },
    Unbound,
}

pub async fn get_embedding_model<V: VectorStoreAdapter>(
    adapter: &V,
    collection: &str,
) -> AppResult<ModelBinding> {
    let points = adapter.retrieve(collection, vec![metadata_point_id()]).await?;
    match points.into_iter().next() {
        Some(Point {
            payload: PointPayload::Metadata(meta),
            ..
        }) => Ok(ModelBinding::Bound {
            model: meta.embedding_model,
            vector_size: meta.vector_size,
            distance: meta.distance,
        }),
        _ => Ok(ModelBinding::Unbound),
    }
}

/// Reconciles a sync's requested model against the collection's bound model.
/// The bound model always wins: a mismatch is a warning, never an error, so
/// a single stray sync can't silently fork a collection's dimensionality.
pub fn reconcile_model(requested: &str, binding: &ModelBinding) -> String {
    match binding {
        ModelBinding::Bound { model, .. } if model != requested => {
            warn!(
                "requested model '{requested}' disagrees with bound model '{model}'; \
                 coercing to the bound model"
            );
            model.clone()
        }
        ModelBinding::Bound { model, .. } => model.clone(),
        ModelBinding::Unbound => {
            warn!("collection has no bound embedding model; proceeding with requested model '{requested}' unbound");
            requested.to_string()
        }
    }
}

/// Resolves the model a sync against `collection` must actually embed with,
/// so the embedder itself can be constructed against it before any
/// `embed_batch` call is made. Fails if the collection doesn't exist; the
/// bound model always wins over whatever was requested.
pub async fn resolve_effective_model<V: VectorStoreAdapter>(
    adapter: &V,
    collection: &str,
    requested_model: &str,
) -> AppResult<String> {
    if !adapter.exists(collection).await? {
        return Err(AppError::CollectionNotFound(collection.to_string()));
    }
    let binding = get_embedding_model(adapter, collection).await?;
    Ok(reconcile_model(requested_model, &binding))
}

/// Never true for a genuine caller-visible id: guards against accidentally
/// treating the reserved metadata id as a normal chunk id anywhere outside
/// `vector_store`.
pub fn is_reserved_id(id: &Uuid) -> bool {
    *id == metadata_point_id()
}
