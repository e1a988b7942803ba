//! The observable result of a sync: per-path chunk counts by outcome.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub added: Vec<(String, usize)>,
    pub modified: Vec<(String, usize)>,
    pub unchanged: Vec<(String, usize)>,
    pub deleted: Vec<(String, usize)>,
    pub skipped: Vec<String>,
    pub errors: Vec<(String, String)>,
}

impl SyncStats {
    pub fn total_touched(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}
