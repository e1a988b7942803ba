//! Source walker: enumerates a source tree, applies the skip set and
//! optional ignore-file rules, and yields `(abs_path, logical_path)` pairs
//! in either prefix-scoped or flat mode.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::warn;

use crate::config::{is_skip_dir, is_skip_extension, is_skip_name};
use crate::diff::ScopeMode;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub abs_path: PathBuf,
    pub logical_path: String,
}

/// Walks `root`, applying the hard-coded skip set plus the directory's own
/// ignore files (git-style glob semantics via the `ignore` crate), and
/// derives a logical path for every surviving file.
///
/// In `PrefixScoped` mode, `scope_prefix` (e.g. `"repo-name/"`) is prepended
/// to each forward-slash-normalised relative path. In `Flat` mode only the
/// basename is used; colliding basenames are resolved last-write-wins with a
/// warning.
pub fn walk(
    root: &Path,
    mode: ScopeMode,
    scope_prefix: Option<&str>,
) -> AppResult<Vec<WalkedFile>> {
    let root = dunce::canonicalize(root).map_err(AppError::Io)?;

    let mut seen_inodes: HashSet<(u64, u64)> = HashSet::new();
    let mut out = Vec::new();
    let mut flat_seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    let walker = WalkBuilder::new(&root)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(true)
        .max_depth(None)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("walker: skipping unreadable entry: {err}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        if path_has_skip_dir(path, &root) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if is_skip_name(name) {
                continue;
            }
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if is_skip_extension(ext) {
                continue;
            }
        }

        // Cycle detection for symlinked directories: track (dev, ino) pairs
        // of resolved targets and refuse to revisit one within this walk.
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if meta.file_type().is_symlink() {
                match std::fs::canonicalize(path) {
                    Ok(resolved) => {
                        if !resolved.starts_with(&root) {
                            // Never follow links pointing outside the source root.
                            continue;
                        }
                        if let Ok(target_meta) = std::fs::metadata(&resolved) {
                            let key = inode_key(&target_meta);
                            if !seen_inodes.insert(key) {
                                continue;
                            }
                        }
                    }
                    Err(_) => continue,
                }
            }
        }

        let rel = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let logical_path = match mode {
            ScopeMode::PrefixScoped => {
                let prefix = scope_prefix.unwrap_or("");
                format!("{prefix}{rel}")
            }
            ScopeMode::Flat => {
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| rel.clone());
                if let Some(count) = flat_seen.get_mut(&basename) {
                    *count += 1;
                    warn!(
                        "walker: duplicate basename '{basename}' in flat mode, last write wins"
                    );
                } else {
                    flat_seen.insert(basename.clone(), 1);
                }
                basename
            }
        };

        match mode {
            ScopeMode::Flat => {
                out.retain(|f: &WalkedFile| f.logical_path != logical_path);
                out.push(WalkedFile {
                    abs_path: path.to_path_buf(),
                    logical_path,
                });
            }
            ScopeMode::PrefixScoped => {
                out.push(WalkedFile {
                    abs_path: path.to_path_buf(),
                    logical_path,
                });
            }
        }
    }

    Ok(out)
}

fn path_has_skip_dir(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(is_skip_dir)
}

#[cfg(unix)]
fn inode_key(meta: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn inode_key(meta: &std::fs::Metadata) -> (u64, u64) {
    (0, meta.len())
}
