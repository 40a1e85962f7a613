use std::collections::BTreeMap;

use crate::model::{EvaluationRecord, SummaryMetrics};

pub fn summarize(records: &[EvaluationRecord], ks: &[usize]) -> SummaryMetrics {
    let total = records.len();

    let hit_rate = ks
        .iter()
        .map(|k| {
            let hits = records.iter().filter(|record| record.hit_at(*k)).count();
            (*k, ratio(hits as f64, total))
        })
        .collect::<BTreeMap<usize, f64>>();

    let mrr = ratio(
        records.iter().map(|record| record.reciprocal_rank).sum::<f64>(),
        total,
    );

    let ranks = records
        .iter()
        .filter_map(|record| record.rank_of_expected)
        .collect::<Vec<usize>>();
    let avg_rank_of_hits = mean_rank(&ranks);

    let mut rank_distribution = BTreeMap::<usize, usize>::new();
    for rank in &ranks {
        *rank_distribution.entry(*rank).or_default() += 1;
    }

    let top1_correct = ks
        .contains(&1)
        .then(|| records.iter().filter(|record| record.hit_at(1)).count());

    SummaryMetrics {
        total_queries: total,
        hit_rate,
        mrr,
        avg_rank_of_hits,
        hits: ranks.len(),
        misses: total - ranks.len(),
        failed_retrievals: records
            .iter()
            .filter(|record| record.retrieval_failed)
            .count(),
        rank_distribution,
        top1_correct,
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn mean_rank(ranks: &[usize]) -> Option<f64> {
    if ranks.is_empty() {
        return None;
    }
    Some(ranks.iter().sum::<usize>() as f64 / ranks.len() as f64)
}
