use thiserror::Error;

/// Crate-wide error type. Variants are grouped by recoverability so callers
/// can match on the taxonomy (transient / terminal / file-local) rather than
/// on individual causes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("embedding provider rejected the request (auth): {0}")]
    EmbedderAuth(String),

    #[error("embedding model not found: {0}")]
    EmbedderModelNotFound(String),

    #[error("embedding provider unreachable after retries: {0}")]
    EmbedderTransient(String),

    #[error("unknown embedding model '{0}'; vector size must be supplied explicitly")]
    UnknownModelDimension(String),

    #[error("requested embedding model '{requested}' disagrees with collection's bound model '{bound}'")]
    ModelMismatch { requested: String, bound: String },

    #[error("vector-store request failed: {0}")]
    VectorStore(String),

    #[error("upsert batch failed after retries: {0}")]
    UpsertFailed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("source walker error: {0}")]
    Walker(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors the caller should not retry: auth, missing model,
    /// missing collection. Transient network/upsert failures are not terminal
    /// until the retry budget is exhausted, at which point they arrive here
    /// as one of these variants too.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppError::EmbedderAuth(_)
                | AppError::EmbedderModelNotFound(_)
                | AppError::CollectionNotFound(_)
                | AppError::UnknownModelDimension(_)
                | AppError::ModelMismatch { .. }
        )
    }

    /// Maps this error to the process exit code the CLI surface is
    /// contractually required to return (0 success is handled by the caller,
    /// not here).
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Cancelled => 130,
            _ => 1,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
