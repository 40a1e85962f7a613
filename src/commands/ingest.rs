use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cli::IngestArgs;
use crate::model::IngestRunManifest;
use crate::store::{NewDocument, SqliteVectorStore};
use crate::util::{
    ensure_directory, now_utc_string, parse_utc_timestamp, sha256_file, utc_compact_string,
    write_json_pretty,
};

#[derive(Debug, Deserialize)]
struct DatasetRow {
    content: String,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Default)]
struct IngestCounts {
    rows_read: usize,
    rows_inserted: usize,
    rows_skipped_empty: usize,
    raw_metadata_rows: usize,
    invalid_created_at_rows: usize,
}

pub fn run(args: IngestArgs) -> Result<()> {
    if args.batch_size == 0 {
        bail!("--batch-size must be a positive integer");
    }
    if !args.delimiter.is_ascii() {
        bail!("--delimiter must be a single ASCII character");
    }

    let started = Instant::now();
    let run_id = format!("ingest-{}", utc_compact_string(Utc::now()));
    let manifest_dir = args.store.manifest_dir();
    ensure_directory(&manifest_dir)?;

    let db_path = args.store.resolved_db_path();
    let mut store = SqliteVectorStore::open(&db_path, &args.store.table_name)?;
    info!(
        run_id = %run_id,
        dataset = %args.dataset_path.display(),
        path = %db_path.display(),
        table = %store.table_name(),
        "ingest started"
    );

    let counts = load_dataset(
        &mut store,
        &args.dataset_path,
        args.delimiter as u8,
        args.batch_size,
    )?;
    let documents_total = store.document_count()?;

    let mut warnings = Vec::<String>::new();
    if counts.rows_skipped_empty > 0 {
        warnings.push(format!(
            "skipped {} row(s) with empty content",
            counts.rows_skipped_empty
        ));
    }
    if counts.raw_metadata_rows > 0 {
        warnings.push(format!(
            "{} row(s) had non-JSON metadata stored under \"raw\"",
            counts.raw_metadata_rows
        ));
    }
    if counts.invalid_created_at_rows > 0 {
        warnings.push(format!(
            "{} row(s) had an unparseable created_at and were stamped with the ingest time",
            counts.invalid_created_at_rows
        ));
    }
    for warning in &warnings {
        warn!(run_id = %run_id, "{warning}");
    }

    let model = store.model();
    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        status: "completed".to_string(),
        dataset_path: args.dataset_path.display().to_string(),
        dataset_sha256: sha256_file(&args.dataset_path)?,
        db_path: db_path.display().to_string(),
        table_name: store.table_name().to_string(),
        model_id: model.model_id.clone(),
        embedding_dim: model.dimensions,
        rows_read: counts.rows_read,
        rows_inserted: counts.rows_inserted,
        rows_skipped_empty: counts.rows_skipped_empty,
        raw_metadata_rows: counts.raw_metadata_rows,
        documents_total,
        duration_ms: started.elapsed().as_millis(),
        warnings,
    };

    let manifest_path = manifest_dir.join(format!("{run_id}.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        rows_read = counts.rows_read,
        rows_inserted = counts.rows_inserted,
        documents_total,
        manifest = %manifest_path.display(),
        "ingest completed"
    );

    Ok(())
}

fn load_dataset(
    store: &mut SqliteVectorStore,
    dataset_path: &Path,
    delimiter: u8,
    batch_size: usize,
) -> Result<IngestCounts> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::Headers)
        .from_path(dataset_path)
        .with_context(|| format!("failed to open dataset {}", dataset_path.display()))?;

    let mut counts = IngestCounts::default();
    let mut batch = Vec::<NewDocument>::with_capacity(batch_size);

    for (offset, row) in reader.deserialize::<DatasetRow>().enumerate() {
        let row = row.with_context(|| {
            format!(
                "failed to parse dataset row {} in {}",
                offset + 1,
                dataset_path.display()
            )
        })?;
        counts.rows_read += 1;

        let Some(document) = document_from_row(row, &mut counts) else {
            counts.rows_skipped_empty += 1;
            continue;
        };
        batch.push(document);

        if batch.len() >= batch_size {
            counts.rows_inserted += store.insert_documents(&batch)?;
            debug!(inserted = counts.rows_inserted, "inserted batch");
            batch.clear();
        }
    }

    if !batch.is_empty() {
        counts.rows_inserted += store.insert_documents(&batch)?;
    }

    Ok(counts)
}

fn document_from_row(row: DatasetRow, counts: &mut IngestCounts) -> Option<NewDocument> {
    let contents = row.content.trim();
    if contents.is_empty() {
        return None;
    }

    let metadata = match row.metadata.as_deref().map(str::trim) {
        None | Some("") => json!({}),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(_) => {
                counts.raw_metadata_rows += 1;
                json!({ "raw": raw })
            }
        },
    };

    let created_at = match row.created_at.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match parse_utc_timestamp(raw) {
            Ok(value) => value,
            Err(_) => {
                counts.invalid_created_at_rows += 1;
                Utc::now()
            }
        },
        _ => Utc::now(),
    };

    Some(NewDocument {
        id: Uuid::new_v4().to_string(),
        metadata,
        contents: contents.to_string(),
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{DatasetRow, IngestCounts, document_from_row, load_dataset};
    use crate::store::SqliteVectorStore;

    fn row(content: &str, metadata: Option<&str>, created_at: Option<&str>) -> DatasetRow {
        DatasetRow {
            content: content.to_string(),
            metadata: metadata.map(str::to_string),
            created_at: created_at.map(str::to_string),
        }
    }

    #[test]
    fn json_metadata_is_kept_and_plain_text_is_wrapped() {
        let mut counts = IngestCounts::default();

        let parsed = document_from_row(
            row("body", Some(r#"{"doc_id": "D1"}"#), Some("2024-03-01")),
            &mut counts,
        )
        .expect("document");
        assert_eq!(parsed.metadata, json!({"doc_id": "D1"}));
        assert_eq!(parsed.created_at, "2024-03-01T00:00:00Z");

        let wrapped =
            document_from_row(row("body", Some("not json"), None), &mut counts).expect("document");
        assert_eq!(wrapped.metadata, json!({"raw": "not json"}));
        assert_eq!(counts.raw_metadata_rows, 1);
        assert_ne!(parsed.id, wrapped.id);
    }

    #[test]
    fn blank_content_is_skipped() {
        let mut counts = IngestCounts::default();
        assert!(document_from_row(row("   ", None, None), &mut counts).is_none());
    }

    #[test]
    fn dataset_rows_land_in_the_store_in_batches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = dir.path().join("dataset.csv");
        fs::write(
            &dataset,
            "content;metadata;created_at\n\
             Brakes must be tested;{\"doc_id\": \"D1\"};2024-01-01\n\
             ;{\"doc_id\": \"D2\"};2024-01-02\n\
             Steering requirements;{\"doc_id\": \"D3\"};2024-01-03\n\
             Airbag timing;plain;2024-01-04\n",
        )
        .expect("dataset");

        let mut store = SqliteVectorStore::from_connection(
            rusqlite::Connection::open_in_memory().expect("db"),
            "embeddings",
        )
        .expect("store");

        let counts = load_dataset(&mut store, &dataset, b';', 2).expect("load");
        assert_eq!(counts.rows_read, 4);
        assert_eq!(counts.rows_inserted, 3);
        assert_eq!(counts.rows_skipped_empty, 1);
        assert_eq!(counts.raw_metadata_rows, 1);
        assert_eq!(store.document_count().expect("count"), 3);
    }
}
