//! Source acquisition contract. The actual extraction mechanics
//! (unzip/untar, shallow clone, bucket download) are external collaborators;
//! this module only specifies the resulting local-directory contract and the
//! scope-mode/prefix derivation that the walker and diff engine need.

use std::path::{Path, PathBuf};

use crate::diff::ScopeMode;

/// What the caller handed the orchestrator. `Directory` is the only variant
/// this crate resolves on its own; the others describe the shape an external
/// acquirer is expected to hand back (already extracted/cloned/downloaded to
/// a local directory) together with enough information to derive scope.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// An already-local filesystem root, repo-scoped with the given prefix.
    Directory { root: PathBuf, scope_prefix: String },
    /// An extracted archive root. If it contains a `.git`-bearing
    /// subdirectory, that subdirectory becomes a repo-scoped source; else
    /// the whole extracted root is walked in flat mode.
    ExtractedArchive { root: PathBuf },
    /// A shallow-cloned repository already on disk; `repo_name` is the
    /// last URL path segment with `.git` stripped, and becomes the scope
    /// prefix.
    ClonedRepository { root: PathBuf, repo_name: String },
    /// A downloaded object-storage prefix; `bucket/prefix` becomes the scope
    /// prefix.
    DownloadedObjects { root: PathBuf, bucket: String, prefix: String },
}

/// The resolved walking plan: a local root, a scope mode, and (if
/// prefix-scoped) the prefix to prepend to every relative path.
pub struct ResolvedSource {
    pub root: PathBuf,
    pub mode: ScopeMode,
    pub scope_prefix: Option<String>,
}

impl SourceInput {
    pub fn resolve(self) -> ResolvedSource {
        match self {
            SourceInput::Directory { root, scope_prefix } => ResolvedSource {
                root,
                mode: ScopeMode::PrefixScoped,
                scope_prefix: Some(normalize_prefix(&scope_prefix)),
            },
            SourceInput::ExtractedArchive { root } => {
                if let Some(repo_root) = find_git_repo_subdir(&root) {
                    let name = repo_root
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    ResolvedSource {
                        root: repo_root,
                        mode: ScopeMode::PrefixScoped,
                        scope_prefix: Some(normalize_prefix(&name)),
                    }
                } else {
                    ResolvedSource {
                        root,
                        mode: ScopeMode::Flat,
                        scope_prefix: None,
                    }
                }
            }
            SourceInput::ClonedRepository { root, repo_name } => {
                let name = repo_name.trim_end_matches(".git");
                ResolvedSource {
                    root,
                    mode: ScopeMode::PrefixScoped,
                    scope_prefix: Some(normalize_prefix(name)),
                }
            }
            SourceInput::DownloadedObjects { root, bucket, prefix } => {
                let scope = format!("{bucket}/{prefix}");
                ResolvedSource {
                    root,
                    mode: ScopeMode::PrefixScoped,
                    scope_prefix: Some(normalize_prefix(&scope)),
                }
            }
        }
    }
}

/// Derives a repo name (last URL path segment, `.git` stripped) from a
/// remote repository URL, the way the external clone step would before
/// handing us a `ClonedRepository`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.trim_end_matches(".git").to_string()
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    format!("{trimmed}/")
}

/// If `root` contains exactly one subdirectory with a `.git` entry, returns
/// that subdirectory (the archive's embedded-repo case).
fn find_git_repo_subdir(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join(".git").exists() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_strips_git_suffix() {
        assert_eq!(repo_name_from_url("https://example.com/org/my-repo.git"), "my-repo");
        assert_eq!(repo_name_from_url("https://example.com/org/my-repo"), "my-repo");
    }

    #[test]
    fn directory_source_is_prefix_scoped() {
        let resolved = SourceInput::Directory {
            root: PathBuf::from("/tmp/x"),
            scope_prefix: "repo".into(),
        }
        .resolve();
        assert_eq!(resolved.mode, ScopeMode::PrefixScoped);
        assert_eq!(resolved.scope_prefix.unwrap(), "repo/");
    }

    #[test]
    fn extracted_archive_without_git_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = SourceInput::ExtractedArchive {
            root: dir.path().to_path_buf(),
        }
        .resolve();
        assert_eq!(resolved.mode, ScopeMode::Flat);
    }

    #[test]
    fn extracted_archive_with_git_subdir_is_repo_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("my-repo");
        std::fs::create_dir_all(repo_dir.join(".git")).unwrap();

        let resolved = SourceInput::ExtractedArchive {
            root: dir.path().to_path_buf(),
        }
        .resolve();
        assert_eq!(resolved.mode, ScopeMode::PrefixScoped);
        assert_eq!(resolved.scope_prefix.unwrap(), "my-repo/");
    }
}
