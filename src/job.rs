//! Job abstraction: a uniform description of a sync task for external
//! runtimes, plus the abstract `Runtime` boundary. No concrete runtime
//! (local process, container, cluster, cloud batch) is implemented here —
//! only the contract.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadClass {
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResources {
    pub cpu: String,
    pub memory: String,
    pub gpu: Option<String>,
    pub timeout: Duration,
}

impl JobResources {
    /// Defaults per workload class, sized for upload-style sync jobs.
    pub fn for_class(class: WorkloadClass) -> Self {
        match class {
            WorkloadClass::Light => Self {
                cpu: "0.5".into(),
                memory: "512Mi".into(),
                gpu: None,
                timeout: Duration::from_secs(600),
            },
            WorkloadClass::Medium => Self {
                cpu: "1".into(),
                memory: "2Gi".into(),
                gpu: None,
                timeout: Duration::from_secs(1800),
            },
            WorkloadClass::Heavy => Self {
                cpu: "2".into(),
                memory: "4Gi".into(),
                gpu: None,
                timeout: Duration::from_secs(3600),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub operation: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub resources: JobResources,
    pub image: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl JobDefinition {
    pub fn repo_sync(name: impl Into<String>, repo_url: &str) -> Self {
        Self::new(name, "repo-sync", WorkloadClass::Heavy, vec!["--repo".into(), repo_url.into()])
    }

    pub fn file_sync(name: impl Into<String>, path: &str) -> Self {
        Self::new(name, "file-sync", WorkloadClass::Medium, vec!["--file".into(), path.into()])
    }

    pub fn archive_sync(name: impl Into<String>, archive_path: &str) -> Self {
        Self::new(
            name,
            "archive-sync",
            WorkloadClass::Medium,
            vec!["--archive".into(), archive_path.into()],
        )
    }

    pub fn object_store_sync(name: impl Into<String>, bucket: &str, prefix: &str) -> Self {
        Self::new(
            name,
            "object-store-sync",
            WorkloadClass::Heavy,
            vec!["--bucket".into(), bucket.into(), "--prefix".into(), prefix.into()],
        )
    }

    pub fn collection_ops(name: impl Into<String>, op: &str) -> Self {
        Self::new(name, "collection-ops", WorkloadClass::Light, vec![op.into()])
    }

    fn new(name: impl Into<String>, operation: &str, class: WorkloadClass, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            operation: operation.to_string(),
            command,
            env: HashMap::new(),
            resources: JobResources::for_class(class),
            image: None,
            metadata: HashMap::from([("workload_class".to_string(), format!("{class:?}").to_lowercase())]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Boundary with external execution systems. No implementation ships with
/// this crate; a caller supplies one per backend (local process, container,
/// cluster, cloud batch).
pub trait Runtime: Send + Sync {
    fn submit(
        &self,
        job: JobDefinition,
    ) -> impl std::future::Future<Output = anyhow::Result<String>> + Send;

    fn status(&self, job_id: &str) -> impl std::future::Future<Output = anyhow::Result<JobStatus>> + Send;

    fn result(&self, job_id: &str) -> impl std::future::Future<Output = anyhow::Result<JobResult>> + Send;

    fn cancel(&self, job_id: &str) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn logs(
        &self,
        job_id: &str,
        tail: Option<usize>,
    ) -> impl std::future::Future<Output = anyhow::Result<String>> + Send;

    fn wait(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = anyhow::Result<JobResult>> + Send;

    fn cleanup(&self, job_id: &str) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
