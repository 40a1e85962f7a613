use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::RawResults;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub query: String,
    pub limit: usize,
    pub results: RawResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLogFile {
    pub manifest_version: u32,
    pub generated_at: String,
    pub entries: Vec<SearchLogEntry>,
}

#[derive(Debug, Default)]
pub struct SearchLog {
    entries: Vec<SearchLogEntry>,
}

impl SearchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_search(&mut self, query: &str, limit: usize, results: &RawResults) {
        self.entries.push(SearchLogEntry {
            query: query.to_string(),
            limit,
            results: results.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn export(self, path: &Path) -> Result<()> {
        let entry_count = self.entries.len();
        let file = SearchLogFile {
            manifest_version: 1,
            generated_at: now_utc_string(),
            entries: self.entries,
        };
        write_json_pretty(path, &file)?;
        info!(path = %path.display(), entries = entry_count, "exported search log");
        Ok(())
    }
}

pub fn read_search_log(path: &Path) -> Result<SearchLogFile> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SearchLog, read_search_log};
    use crate::store::RawResults;

    #[test]
    fn exported_log_reads_back_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("search_log.json");

        let mut log = SearchLog::new();
        log.log_search("What is X?", 3, &RawResults::Objects(vec![json!("D1")]));
        log.log_search(
            "What is Y?",
            3,
            &RawResults::Tuples(vec![vec![json!("D2"), json!({})]]),
        );
        assert_eq!(log.len(), 2);
        log.export(&path).expect("export");

        let file = read_search_log(&path).expect("read back");
        assert_eq!(file.entries.len(), 2);
        assert_eq!(file.entries[0].query, "What is X?");
        assert_eq!(
            file.entries[1].results,
            RawResults::Tuples(vec![vec![json!("D2"), json!({})]])
        );
    }
}
