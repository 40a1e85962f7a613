use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::SearchArgs;
use crate::evaluation::SearchLog;
use crate::evaluation::normalize::normalize_candidates;
use crate::semantic::normalize_whitespace;
use crate::store::{RawResults, SqliteVectorStore, TimeRange, VectorStore};

const SNIPPET_CHARS: usize = 160;

#[derive(Debug, Clone, Serialize)]
struct SearchHit {
    rank: usize,
    id: Option<String>,
    distance: Option<f64>,
    snippet: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    limit: usize,
    returned: usize,
    results: Vec<SearchHit>,
}

pub fn run(args: SearchArgs) -> Result<()> {
    if args.limit == 0 {
        bail!("--limit must be a positive integer");
    }

    let db_path = args.store.resolved_db_path();
    let store = SqliteVectorStore::open_existing(&db_path, &args.store.table_name)?;
    let time_range = TimeRange::from_bounds(args.from.as_deref(), args.to.as_deref())?;

    let results = store
        .search(&args.query, args.limit, time_range.as_ref())
        .with_context(|| format!("search failed for query '{}'", args.query))?;
    info!(
        path = %db_path.display(),
        table = %store.table_name(),
        returned = results.len(),
        "search completed"
    );

    let hits = collect_hits(&results, args.limit);
    if args.json {
        write_json_response(&args.query, args.limit, hits)?;
    } else {
        write_text_response(&args.query, &hits)?;
    }

    if let Some(path) = &args.search_log_path {
        let mut search_log = SearchLog::new();
        search_log.log_search(&args.query, args.limit, &results);
        search_log.export(path)?;
    }

    Ok(())
}

fn collect_hits(results: &RawResults, limit: usize) -> Vec<SearchHit> {
    let snippets = match results {
        RawResults::Rows(rows) => rows
            .iter()
            .map(|row| row.get("content").map(snippet).unwrap_or_default())
            .collect::<Vec<String>>(),
        _ => Vec::new(),
    };

    normalize_candidates(Some(results), limit)
        .into_iter()
        .enumerate()
        .map(|(offset, candidate)| SearchHit {
            rank: offset + 1,
            id: candidate.identifier,
            distance: candidate.distance,
            snippet: snippets.get(offset).cloned().unwrap_or_default(),
        })
        .collect()
}

fn snippet(value: &Value) -> String {
    let text = match value {
        Value::String(text) => normalize_whitespace(text),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.chars().count() <= SNIPPET_CHARS {
        return text;
    }
    let mut cut = text.chars().take(SNIPPET_CHARS).collect::<String>();
    cut.push_str("...");
    cut
}

fn write_json_response(query: &str, limit: usize, results: Vec<SearchHit>) -> Result<()> {
    let response = SearchResponse {
        query,
        limit,
        returned: results.len(),
        results,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize search json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(query: &str, hits: &[SearchHit]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Query: {query}")?;
    writeln!(output, "Results: {}", hits.len())?;
    for hit in hits {
        let distance = hit
            .distance
            .map(|value| format!("{value:.6}"))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            output,
            "{}.\t{}\tdistance={}",
            hit.rank,
            hit.id.as_deref().unwrap_or("(no id)"),
            distance
        )?;
        if !hit.snippet.is_empty() {
            writeln!(output, "\t{}", hit.snippet)?;
        }
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SNIPPET_CHARS, collect_hits, snippet};
    use crate::store::RawResults;

    #[test]
    fn hits_carry_ids_distances_and_collapsed_snippets() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), json!("D1"));
        row.insert("content".to_string(), json!("first\n\nline   here"));
        row.insert("distance".to_string(), json!(0.125));

        let hits = collect_hits(&RawResults::Rows(vec![row]), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].id.as_deref(), Some("D1"));
        assert_eq!(hits[0].distance, Some(0.125));
        assert_eq!(hits[0].snippet, "first line here");
    }

    #[test]
    fn long_content_is_cut() {
        let long = "x".repeat(SNIPPET_CHARS + 10);
        let cut = snippet(&json!(long));
        assert_eq!(cut.chars().count(), SNIPPET_CHARS + 3);
        assert!(cut.ends_with("..."));
    }
}
