//! Diff engine: partitions local vs remote `{logical_path -> FileHash}` maps
//! into new/modified/unchanged/deleted.

use std::collections::BTreeMap;

use crate::fingerprint::FileHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Repository/directory sources. Deletions are meaningful.
    PrefixScoped,
    /// Loose-archive sources. Deletions are never inferred.
    Flat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

/// `local` and `remote` are `{logical_path -> FileHash}`. Output sets are
/// sorted by `logical_path` so results are deterministic.
pub fn diff(
    local: &BTreeMap<String, FileHash>,
    remote: &BTreeMap<String, FileHash>,
    mode: ScopeMode,
) -> DiffResult {
    let mut result = DiffResult::default();

    for (path, local_hash) in local {
        match remote.get(path) {
            None => result.new.push(path.clone()),
            Some(remote_hash) if remote_hash == local_hash => result.unchanged.push(path.clone()),
            Some(_) => result.modified.push(path.clone()),
        }
    }

    if mode == ScopeMode::PrefixScoped {
        for path in remote.keys() {
            if !local.contains_key(path) {
                result.deleted.push(path.clone());
            }
        }
    }

    result.new.sort();
    result.modified.sort();
    result.unchanged.sort();
    result.deleted.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, FileHash> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn partitions_with_no_overlap() {
        let local = map(&[("a", "h1"), ("b", "h2"), ("c", "h3")]);
        let remote = map(&[("b", "h2-old"), ("c", "h3"), ("d", "h4")]);

        let d = diff(&local, &remote, ScopeMode::PrefixScoped);
        assert_eq!(d.new, vec!["a".to_string()]);
        assert_eq!(d.modified, vec!["b".to_string()]);
        assert_eq!(d.unchanged, vec!["c".to_string()]);
        assert_eq!(d.deleted, vec!["d".to_string()]);
    }

    #[test]
    fn flat_mode_never_infers_deletion() {
        let local = map(&[("a", "h1")]);
        let remote = map(&[("z", "hz")]);

        let d = diff(&local, &remote, ScopeMode::Flat);
        assert!(d.deleted.is_empty());
        assert_eq!(d.new, vec!["a".to_string()]);
    }

    #[test]
    fn unchanged_when_hashes_equal() {
        let local = map(&[("a", "h1")]);
        let remote = map(&[("a", "h1")]);
        let d = diff(&local, &remote, ScopeMode::PrefixScoped);
        assert_eq!(d.unchanged, vec!["a".to_string()]);
        assert!(d.new.is_empty() && d.modified.is_empty() && d.deleted.is_empty());
    }
}
