use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use ragsync::chunker::LineWindowChunker;
use ragsync::collection;
use ragsync::config::AppConfig;
use ragsync::embedder::{self, EmbedderPool};
use ragsync::error::AppError;
use ragsync::orchestrator::{self, CancellationToken, SyncRequest};
use ragsync::source::{self, SourceInput};
use ragsync::vector_store::{Distance, QdrantHttpAdapter, VectorStoreAdapter};

#[derive(Parser)]
#[command(name = "ragsync", about = "Incremental RAG ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collection lifecycle operations.
    Collections {
        #[command(subcommand)]
        op: CollectionOp,
    },
    /// Sync a source tree into a collection.
    Upload {
        #[command(subcommand)]
        source: UploadSource,
    },
}

#[derive(Subcommand)]
enum CollectionOp {
    List,
    Create {
        name: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        dim: Option<usize>,
        #[arg(long, value_enum, default_value = "cosine")]
        distance: DistanceArg,
    },
    Delete {
        name: String,
    },
    Info {
        name: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum DistanceArg {
    Cosine,
    Euclid,
    Dot,
}

impl From<DistanceArg> for Distance {
    fn from(value: DistanceArg) -> Self {
        match value {
            DistanceArg::Cosine => Distance::Cosine,
            DistanceArg::Euclid => Distance::Euclid,
            DistanceArg::Dot => Distance::Dot,
        }
    }
}

#[derive(Subcommand)]
enum UploadSource {
    /// Sync a local directory, repo-scoped under `prefix`.
    Directory {
        path: PathBuf,
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        model: String,
    },
    /// Sync an already-extracted archive root.
    Archive {
        path: PathBuf,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        model: String,
    },
    /// Sync an already shallow-cloned repository.
    Repo {
        path: PathBuf,
        /// Remote URL the clone came from, used only to derive the scope
        /// prefix (the clone itself is an external caller responsibility).
        #[arg(long)]
        url: String,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        model: String,
    },
    /// Sync an already-downloaded object-storage prefix.
    ObjectStore {
        path: PathBuf,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        error!(target: "ragsync::panic", location = %location, "PANIC: thread panicked");
        default_panic(info);
    }));

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_tracing() {
    let log_dir = std::env::var("RAGSYNC_LOG_DIR").unwrap_or_else(|_| {
        dirs::data_local_dir()
            .map(|d| d.join("ragsync").join("logs").to_string_lossy().to_string())
            .unwrap_or_else(|| ".ragsync-data/logs".to_string())
    });
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragsync.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    // Leaking the guard is deliberate: it must outlive every subsequent
    // tracing call for the remainder of the process.
    Box::leak(Box::new(guard));

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ragsync=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

async fn run(command: Command, config: &AppConfig) -> Result<(), AppError> {
    let adapter = QdrantHttpAdapter::new(&config.vector_store_url)?;

    match command {
        Command::Collections { op } => run_collection_op(op, &adapter).await,
        Command::Upload { source } => run_upload(source, &adapter, config).await,
    }
}

async fn run_collection_op(op: CollectionOp, adapter: &QdrantHttpAdapter) -> Result<(), AppError> {
    match op {
        CollectionOp::List => {
            let names = adapter.list_collections().await?;
            for name in names {
                info!(collection = %name, "collection");
            }
            Ok(())
        }
        CollectionOp::Create { name, model, dim, distance } => {
            let dim = match dim.or_else(|| embedder::vector_size_for_model(&model)) {
                Some(d) => d,
                None => return Err(AppError::UnknownModelDimension(model)),
            };
            collection::create_collection(adapter, &name, dim, &model, distance.into()).await?;
            info!(collection = %name, dim, "collection created");
            Ok(())
        }
        CollectionOp::Delete { name } => {
            adapter.delete_collection(&name).await?;
            info!(collection = %name, "collection deleted");
            Ok(())
        }
        CollectionOp::Info { name } => {
            if !adapter.exists(&name).await? {
                return Err(AppError::CollectionNotFound(name));
            }
            let binding = collection::get_embedding_model(adapter, &name).await?;
            let count = adapter.count(&name).await?;
            match binding {
                collection::ModelBinding::Bound { model, vector_size, distance } => {
                    info!(collection = %name, %model, vector_size, %distance, points = count, "collection info");
                }
                collection::ModelBinding::Unbound => {
                    info!(collection = %name, points = count, "collection info (no bound model)");
                }
            }
            Ok(())
        }
    }
}

async fn run_upload(source: UploadSource, adapter: &QdrantHttpAdapter, config: &AppConfig) -> Result<(), AppError> {
    let api_token = config
        .embed_api_token
        .clone()
        .ok_or_else(|| AppError::Config("EMBED_API_TOKEN is not set".into()))?;

    let (resolved, collection, model) = match source {
        UploadSource::Directory { path, prefix, collection, model } => (
            SourceInput::Directory { root: path, scope_prefix: prefix }.resolve(),
            collection,
            model,
        ),
        UploadSource::Archive { path, collection, model } => (
            SourceInput::ExtractedArchive { root: path }.resolve(),
            collection,
            model,
        ),
        UploadSource::Repo { path, url, collection, model } => (
            SourceInput::ClonedRepository {
                root: path,
                repo_name: source::repo_name_from_url(&url),
            }
            .resolve(),
            collection,
            model,
        ),
        UploadSource::ObjectStore { path, bucket, prefix, collection, model } => (
            SourceInput::DownloadedObjects { root: path, bucket, prefix }.resolve(),
            collection,
            model,
        ),
    };

    let effective_model = collection::resolve_effective_model(adapter, &collection, &model).await?;

    let pool = EmbedderPool::new();
    let embedder = pool.embedder_for(&effective_model, &api_token)?;
    let chunker = LineWindowChunker::default();
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received Ctrl+C, requesting cancellation");
            cancel_for_signal.cancel();
        }
    });

    let request = SyncRequest {
        root: resolved.root,
        mode: resolved.mode,
        scope_prefix: resolved.scope_prefix,
        collection,
        embedding_model: effective_model,
        api_token,
    };

    let stats = orchestrator::sync(adapter, &embedder, &chunker, config, request, cancel).await?;

    info!(
        added = stats.added.len(),
        modified = stats.modified.len(),
        unchanged = stats.unchanged.len(),
        deleted = stats.deleted.len(),
        skipped = stats.skipped.len(),
        errors = stats.errors.len(),
        "sync finished"
    );
    for (path, reason) in &stats.errors {
        tracing::warn!(file = %path, %reason, "file failed to sync");
    }

    Ok(())
}
