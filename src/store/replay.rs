use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::error::RetrievalError;
use crate::evaluation::search_log::{SearchLogEntry, read_search_log};

use super::{RawResults, TimeRange, VectorStore};

pub struct ReplayStore {
    recorded: HashMap<String, RawResults>,
}

impl ReplayStore {
    pub fn from_path(path: &Path) -> Result<Self> {
        let log = read_search_log(path)?;
        let store = Self::from_entries(log.entries);
        info!(
            path = %path.display(),
            queries = store.recorded.len(),
            "loaded replay search log"
        );
        Ok(store)
    }

    /// The first recording of a query wins.
    pub fn from_entries(entries: Vec<SearchLogEntry>) -> Self {
        let mut recorded = HashMap::<String, RawResults>::new();
        for entry in entries {
            recorded
                .entry(entry.query.trim().to_string())
                .or_insert(entry.results);
        }
        Self { recorded }
    }
}

impl VectorStore for ReplayStore {
    fn search(
        &self,
        query: &str,
        limit: usize,
        _time_range: Option<&TimeRange>,
    ) -> Result<RawResults, RetrievalError> {
        self.recorded
            .get(query.trim())
            .cloned()
            .map(|results| results.truncated(limit))
            .ok_or_else(|| RetrievalError::NotRecorded(query.to_string()))
    }

    fn kind(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ReplayStore;
    use crate::error::RetrievalError;
    use crate::evaluation::search_log::SearchLogEntry;
    use crate::store::{RawResults, VectorStore};

    fn entry(query: &str, ids: &[&str]) -> SearchLogEntry {
        SearchLogEntry {
            query: query.to_string(),
            limit: ids.len(),
            results: RawResults::Objects(ids.iter().map(|id| json!(id)).collect()),
        }
    }

    #[test]
    fn replays_first_recording_truncated_to_limit() {
        let store = ReplayStore::from_entries(vec![
            entry("What is X?", &["D2", "D1", "D3"]),
            entry("What is X?", &["D9"]),
        ]);

        let results = store.search(" What is X? ", 2, None).expect("recorded");
        assert_eq!(
            results,
            RawResults::Objects(vec![json!("D2"), json!("D1")])
        );
    }

    #[test]
    fn unknown_query_is_a_retrieval_error() {
        let store = ReplayStore::from_entries(Vec::new());
        let err = store.search("missing", 3, None).expect_err("not recorded");
        assert!(matches!(err, RetrievalError::NotRecorded(_)));
    }
}
