use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub question: String,
    pub expected_document_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    pub identifier: Option<String>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub timestamp: String,
    pub question: String,
    pub expected_document_id: String,
    pub retrieved_ids: Vec<Option<String>>,
    pub retrieved_distances: Vec<Option<f64>>,
    pub rank_of_expected: Option<usize>,
    pub reciprocal_rank: f64,
    pub hits: BTreeMap<usize, bool>,
    pub retrieval_failed: bool,
}

impl EvaluationRecord {
    pub fn hit_at(&self, k: usize) -> bool {
        self.hits.get(&k).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_queries: usize,
    pub hit_rate: BTreeMap<usize, f64>,
    pub mrr: f64,
    pub avg_rank_of_hits: Option<f64>,
    pub hits: usize,
    pub misses: usize,
    pub failed_retrievals: usize,
    pub rank_distribution: BTreeMap<usize, usize>,
    pub top1_correct: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub status: String,
    pub groundtruth_path: String,
    pub groundtruth_sha256: String,
    pub report_path: String,
    pub store_kind: String,
    pub ks: Vec<usize>,
    pub sample_size: Option<usize>,
    pub seed: u64,
    pub loaded_queries: usize,
    pub evaluated_queries: usize,
    pub truncated: bool,
    pub duration_ms: u128,
    pub summary: SummaryMetrics,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub status: String,
    pub dataset_path: String,
    pub dataset_sha256: String,
    pub db_path: String,
    pub table_name: String,
    pub model_id: String,
    pub embedding_dim: usize,
    pub rows_read: usize,
    pub rows_inserted: usize,
    pub rows_skipped_empty: usize,
    pub raw_metadata_rows: usize,
    pub documents_total: i64,
    pub duration_ms: u128,
    pub warnings: Vec<String>,
}
