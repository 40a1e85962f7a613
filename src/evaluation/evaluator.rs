use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::evaluation::normalize::normalize;
use crate::evaluation::search_log::SearchLog;
use crate::model::{EvaluationRecord, QueryRecord};
use crate::store::{TimeRange, VectorStore};
use crate::util::now_utc_micros_string;

const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    ks: Vec<usize>,
    time_range: Option<TimeRange>,
    max_duration: Option<Duration>,
}

impl EvaluationSettings {
    pub fn new(ks: &[usize]) -> Result<Self> {
        let mut ks = ks.to_vec();
        ks.sort_unstable();
        ks.dedup();

        if ks.is_empty() {
            bail!("at least one K value is required");
        }
        if ks.contains(&0) {
            bail!("K values must be positive integers");
        }

        Ok(Self {
            ks,
            time_range: None,
            max_duration: None,
        })
    }

    pub fn with_time_range(mut self, time_range: Option<TimeRange>) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn ks(&self) -> &[usize] {
        &self.ks
    }

    pub fn max_k(&self) -> usize {
        self.ks.last().copied().unwrap_or(1)
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRun {
    pub records: Vec<EvaluationRecord>,
    /// Set when the run stopped early; `records` covers the queries before the stop.
    pub truncated: bool,
}

pub fn evaluate_queries<S: VectorStore + ?Sized>(
    store: &S,
    queries: &[QueryRecord],
    settings: &EvaluationSettings,
    mut search_log: Option<&mut SearchLog>,
) -> EvaluationRun {
    let started = Instant::now();
    let total = queries.len();
    let first_k = settings.ks()[0];
    let mut records = Vec::<EvaluationRecord>::with_capacity(total);
    let mut first_k_hits = 0usize;
    let mut truncated = false;

    for (offset, query) in queries.iter().enumerate() {
        if let Some(max_duration) = settings.max_duration
            && started.elapsed() >= max_duration
        {
            warn!(
                processed = offset,
                total,
                max_duration_secs = max_duration.as_secs(),
                "evaluation time budget exhausted; stopping between queries"
            );
            truncated = true;
            break;
        }

        let index = offset + 1;
        let record = evaluate_query(
            store,
            query,
            index,
            total,
            settings,
            search_log.as_deref_mut(),
        );
        if record.hit_at(first_k) {
            first_k_hits += 1;
        }
        records.push(record);

        if index % PROGRESS_EVERY == 0 || index == total {
            info!(
                processed = index,
                total,
                first_k,
                first_k_hits,
                last_expected = %query.expected_document_id,
                "evaluation progress"
            );
        }
    }

    EvaluationRun { records, truncated }
}

pub fn evaluate_query<S: VectorStore + ?Sized>(
    store: &S,
    query: &QueryRecord,
    index: usize,
    total: usize,
    settings: &EvaluationSettings,
    search_log: Option<&mut SearchLog>,
) -> EvaluationRecord {
    let limit = settings.max_k();
    match store.search(&query.question, limit, settings.time_range.as_ref()) {
        Ok(results) => {
            if let Some(search_log) = search_log {
                search_log.log_search(&query.question, limit, &results);
            }
            let (ids, distances) = normalize(Some(&results), limit);
            score_retrieval(query, ids, distances, settings.ks())
        }
        Err(err) => {
            warn!(
                query_index = index,
                total,
                question = %query.question,
                error = %err,
                "retrieval failed; recording an empty result"
            );
            let mut record = score_retrieval(query, Vec::new(), Vec::new(), settings.ks());
            record.retrieval_failed = true;
            record
        }
    }
}

pub fn score_retrieval(
    query: &QueryRecord,
    retrieved_ids: Vec<Option<String>>,
    retrieved_distances: Vec<Option<f64>>,
    ks: &[usize],
) -> EvaluationRecord {
    let expected = query.expected_document_id.trim();
    let rank_of_expected = retrieved_ids
        .iter()
        .position(|identifier| identifier.as_deref().map(str::trim) == Some(expected))
        .map(|position| position + 1);

    let reciprocal_rank = rank_of_expected
        .map(|rank| 1.0 / rank as f64)
        .unwrap_or(0.0);

    let hits = ks
        .iter()
        .map(|k| (*k, rank_of_expected.is_some_and(|rank| rank <= *k)))
        .collect::<BTreeMap<usize, bool>>();

    EvaluationRecord {
        timestamp: now_utc_micros_string(),
        question: query.question.clone(),
        expected_document_id: query.expected_document_id.clone(),
        retrieved_ids,
        retrieved_distances,
        rank_of_expected,
        reciprocal_rank,
        hits,
        retrieval_failed: false,
    }
}
