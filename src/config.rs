use serde::{Deserialize, Serialize};

/// Pipeline and worker-pool configuration, loaded from the environment with
/// defaults matching the recommended values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub vector_store_url: String,
    pub embed_api_token: Option<String>,

    pub hasher_workers: usize,
    pub chunker_workers: usize,

    pub max_pending: usize,
    pub upload_threshold: usize,
    pub embed_batch: usize,
    pub upsert_batch: usize,
    pub delete_batch: usize,

    pub job_timeout_secs: u64,
    pub data_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("RAGSYNC_DATA_DIR").unwrap_or_else(|_| {
            dirs::data_local_dir()
                .map(|d| d.join("ragsync").to_string_lossy().to_string())
                .unwrap_or_else(|| ".ragsync-data".to_string())
        });

        Self {
            vector_store_url: std::env::var("VECTOR_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            embed_api_token: std::env::var("EMBED_API_TOKEN").ok(),

            hasher_workers: env_usize("SYNC_HASHER_WORKERS", 16),
            chunker_workers: env_usize("SYNC_CHUNKER_WORKERS", 4),

            max_pending: env_usize("SYNC_MAX_PENDING", 100),
            upload_threshold: env_usize("SYNC_UPLOAD_THRESHOLD", 500),
            embed_batch: env_usize("SYNC_EMBED_BATCH", 10),
            upsert_batch: env_usize("SYNC_UPSERT_BATCH", 100),
            delete_batch: env_usize("SYNC_DELETE_BATCH", 100),

            job_timeout_secs: std::env::var("SYNC_JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            data_dir,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Directories and names the source walker skips unconditionally.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    "node_modules",
    "venv",
    ".venv",
    "env",
    ".env",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    ".output",
    ".vite",
    ".turbo",
    ".svelte-kit",
    ".parcel-cache",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "coverage",
    ".nyc_output",
    ".cache",
    "vendor",
    ".gradle",
    ".idea",
    ".vscode",
    ".terraform",
];

/// File extensions (without leading dot, lowercase) treated as binary/build
/// artefacts and never walked.
pub const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svgz", "pdf", "zip", "tar", "gz", "bz2",
    "xz", "7z", "rar", "exe", "dll", "so", "dylib", "o", "obj", "a", "lib", "class", "jar", "pyc",
    "pyo", "woff", "woff2", "ttf", "eot", "mp3", "mp4", "mov", "avi", "wasm", "bin", "dat",
];

/// File basenames always skipped: OS metadata and VCS bookkeeping.
pub const SKIP_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", ".gitignore", ".gitattributes"];

pub fn is_skip_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

pub fn is_skip_extension(ext: &str) -> bool {
    SKIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_skip_name(name: &str) -> bool {
    SKIP_NAMES.contains(&name)
}
