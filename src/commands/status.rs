use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{EvalRunManifest, IngestRunManifest};
use crate::store::SqliteVectorStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.store.manifest_dir();
    let db_path = args.store.resolved_db_path();

    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if db_path.exists() {
        let store = SqliteVectorStore::open_existing(&db_path, &args.store.table_name)?;
        let model = store.model();
        info!(
            path = %db_path.display(),
            table = %store.table_name(),
            documents = store.document_count()?,
            model_id = %model.model_id,
            dimensions = model.dimensions,
            normalization = %model.normalization,
            backend = %model.backend,
            "vector store status"
        );
    } else {
        warn!(path = %db_path.display(), "vector store missing");
    }

    match latest_manifest(&manifest_dir, "ingest-")? {
        Some(path) => {
            let ingest: IngestRunManifest = read_manifest(&path)?;
            info!(
                run_id = %ingest.run_id,
                generated_at = %ingest.generated_at,
                dataset = %ingest.dataset_path,
                rows_inserted = ingest.rows_inserted,
                documents_total = ingest.documents_total,
                "latest ingest run"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no ingest run manifest found"),
    }

    match latest_manifest(&manifest_dir, "eval-")? {
        Some(path) => {
            let eval: EvalRunManifest = read_manifest(&path)?;
            let summary = &eval.summary;
            info!(
                run_id = %eval.run_id,
                generated_at = %eval.generated_at,
                status = %eval.status,
                store_kind = %eval.store_kind,
                queries = summary.total_queries,
                mrr = summary.mrr,
                hit_rate = ?summary.hit_rate,
                failed_retrievals = summary.failed_retrievals,
                "latest evaluation run"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no evaluation run manifest found"),
    }

    Ok(())
}

fn latest_manifest(manifest_dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    for entry in fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to list {}", manifest_dir.display()))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(".json") {
            continue;
        }
        if latest
            .as_ref()
            .is_none_or(|current| current.file_name() < path.file_name())
        {
            latest = Some(path);
        }
    }

    Ok(latest)
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::{latest_manifest, run};
    use crate::cli::{Cli, Commands, StatusArgs};
    use crate::store::SqliteVectorStore;

    fn status_args(cache_root: &std::path::Path, table: &str) -> StatusArgs {
        let cli = Cli::try_parse_from([
            "rageval",
            "status",
            "--cache-root",
            cache_root.to_str().expect("utf-8 path"),
            "--table-name",
            table,
        ])
        .expect("status args");
        match cli.command {
            Commands::Status(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn status_reports_an_existing_store_and_rejects_unknown_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = status_args(dir.path(), "embeddings");
        SqliteVectorStore::open(&args.store.resolved_db_path(), "embeddings").expect("create");

        run(args).expect("status on a valid store");

        let err = run(status_args(dir.path(), "embedings"))
            .expect_err("unknown table should fail instead of reporting zero documents");
        assert!(format!("{err:#}").contains("not found"));
    }

    #[test]
    fn latest_manifest_picks_newest_matching_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "eval-20240101T000000Z.json",
            "eval-20240301T000000Z.json",
            "ingest-20240501T000000Z.json",
            "eval-20240401T000000Z.txt",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write");
        }

        let latest = latest_manifest(dir.path(), "eval-")
            .expect("scan")
            .expect("an eval manifest");
        assert_eq!(
            latest.file_name().and_then(|name| name.to_str()),
            Some("eval-20240301T000000Z.json")
        );
    }

    #[test]
    fn missing_manifest_dir_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(
            latest_manifest(&dir.path().join("absent"), "ingest-")
                .expect("scan")
                .is_none()
        );
    }
}
