use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::EvalError;
use crate::model::{EvaluationRecord, SummaryMetrics};
use crate::util::ensure_parent_directory;

const FIXED_COLUMNS: [&str; 7] = [
    "timestamp",
    "question",
    "expected_document_id",
    "retrieved_ids",
    "retrieved_distances",
    "rank_of_expected",
    "reciprocal_rank",
];

pub fn write_report_csv(
    path: &Path,
    records: &[EvaluationRecord],
    ks: &[usize],
) -> Result<(), EvalError> {
    ensure_parent_directory(path).map_err(|err| {
        EvalError::report_write(path, io::Error::other(err.to_string()))
    })?;

    let mut writer = csv::Writer::from_path(path).map_err(|err| EvalError::report_write(path, err))?;

    let mut header = FIXED_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<String>>();
    header.extend(ks.iter().map(|k| format!("hit@{k}")));
    writer
        .write_record(&header)
        .map_err(|err| EvalError::report_write(path, err))?;

    for record in records {
        writer
            .write_record(report_row(record, ks))
            .map_err(|err| EvalError::report_write(path, err))?;
    }

    writer
        .flush()
        .map_err(|err| EvalError::report_write(path, err))?;
    Ok(())
}

fn report_row(record: &EvaluationRecord, ks: &[usize]) -> Vec<String> {
    let mut row = vec![
        record.timestamp.clone(),
        record.question.clone(),
        record.expected_document_id.clone(),
        json_list(&record.retrieved_ids),
        json_list(&record.retrieved_distances),
        record
            .rank_of_expected
            .map(|rank| rank.to_string())
            .unwrap_or_default(),
        record.reciprocal_rank.to_string(),
    ];
    row.extend(ks.iter().map(|k| record.hit_at(*k).to_string()));
    row
}

fn json_list<T: serde::Serialize>(values: &[T]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub fn render_console_summary(summary: &SummaryMetrics, ks: &[usize]) -> String {
    let mut lines = vec!["=== Summary metrics ===".to_string()];
    lines.push(format!("Queries evaluated: {}", summary.total_queries));
    if let Some(correct) = summary.top1_correct {
        lines.push(format!(
            "Top-1 accuracy: {:.4} ({correct}/{})",
            summary.hit_rate.get(&1).copied().unwrap_or(0.0),
            summary.total_queries
        ));
    }
    for k in ks {
        let rate = summary.hit_rate.get(k).copied().unwrap_or(0.0);
        lines.push(format!("Hit@{k}: {rate:.4}"));
    }
    lines.push(format!("MRR: {:.4}", summary.mrr));
    if let Some(avg_rank) = summary.avg_rank_of_hits {
        lines.push(format!("Average rank for hits: {avg_rank:.2}"));
    }
    if !summary.rank_distribution.is_empty() {
        let distribution = summary
            .rank_distribution
            .iter()
            .map(|(rank, count)| format!("{rank}:{count}"))
            .collect::<Vec<String>>()
            .join(" ");
        lines.push(format!(
            "Rank distribution: {distribution} (misses: {})",
            summary.misses
        ));
    }
    if summary.failed_retrievals > 0 {
        lines.push(format!("Failed retrievals: {}", summary.failed_retrievals));
    }
    lines.join("\n")
}

pub fn write_console_summary<W: Write>(
    output: &mut W,
    summary: &SummaryMetrics,
    ks: &[usize],
) -> Result<()> {
    writeln!(output)?;
    writeln!(output, "{}", render_console_summary(summary, ks))?;
    output.flush().context("failed to flush summary output")?;
    Ok(())
}
