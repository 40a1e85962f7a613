use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{EvalArgs, StoreKind};
use crate::evaluation::{
    EvaluationSettings, SearchLog, evaluate_queries, load_groundtruth, sample_queries, summarize,
    write_console_summary, write_report_csv,
};
use crate::model::EvalRunManifest;
use crate::store::{ReplayStore, SqliteVectorStore, TimeRange, VectorStore};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: EvalArgs) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    execute(args, &mut output)
}

fn execute<W: Write>(args: EvalArgs, output: &mut W) -> Result<()> {
    let time_range = TimeRange::from_bounds(args.from.as_deref(), args.to.as_deref())?;
    let settings = EvaluationSettings::new(&args.ks)?
        .with_time_range(time_range)
        .with_max_duration(args.max_duration_secs.map(Duration::from_secs));

    let queries = load_groundtruth(&args.groundtruth_path)?;
    let groundtruth_sha256 = sha256_file(&args.groundtruth_path)?;
    let loaded_queries = queries.len();
    info!(
        path = %args.groundtruth_path.display(),
        queries = loaded_queries,
        "loaded groundtruth"
    );

    let queries = sample_queries(queries, args.sample_size, args.seed);
    info!(
        sampled = queries.len(),
        sample_size = ?args.sample_size,
        seed = args.seed,
        "prepared query set"
    );

    let store = open_store(&args)?;
    let generated_at = now_utc_string();
    let run_id = format!("eval-{}", utc_compact_string(Utc::now()));
    let started = Instant::now();

    let mut search_log = search_log_for(&args);
    let run = evaluate_queries(store.as_ref(), &queries, &settings, search_log.as_mut());
    info!(
        run_id = %run_id,
        store_kind = args.store_kind.as_str(),
        evaluated = run.records.len(),
        searches_logged = search_log.as_ref().map_or(0, SearchLog::len),
        truncated = run.truncated,
        "retrieval pass finished"
    );

    let summary = summarize(&run.records, settings.ks());
    write_console_summary(output, &summary, settings.ks())?;

    write_report_csv(&args.output_path, &run.records, settings.ks())?;
    info!(
        path = %args.output_path.display(),
        rows = run.records.len(),
        "wrote evaluation report"
    );

    let mut warnings = Vec::<String>::new();
    if let (Some(search_log), Some(path)) = (search_log, &args.search_log_path)
        && let Err(err) = search_log.export(path)
    {
        warnings.push(format!(
            "failed to export search log {}: {err:#}",
            path.display()
        ));
    }
    if run.truncated {
        warnings.push(format!(
            "evaluation stopped early after {} of {} queries",
            run.records.len(),
            queries.len()
        ));
    }
    if summary.failed_retrievals > 0 {
        warnings.push(format!(
            "{} retrieval(s) failed and were scored as misses",
            summary.failed_retrievals
        ));
    }
    for warning in &warnings {
        warn!(run_id = %run_id, "{warning}");
    }

    let manifest = EvalRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at,
        status: if run.truncated { "partial" } else { "completed" }.to_string(),
        groundtruth_path: args.groundtruth_path.display().to_string(),
        groundtruth_sha256,
        report_path: args.output_path.display().to_string(),
        store_kind: store.kind().to_string(),
        ks: settings.ks().to_vec(),
        sample_size: args.sample_size,
        seed: args.seed,
        loaded_queries,
        evaluated_queries: run.records.len(),
        truncated: run.truncated,
        duration_ms: started.elapsed().as_millis(),
        summary,
        warnings,
    };

    let summary_path = args
        .summary_path
        .clone()
        .unwrap_or_else(|| default_summary_path(&args.output_path));
    write_json_pretty(&summary_path, &manifest)?;

    let manifest_path = args
        .store
        .manifest_dir()
        .join(format!("{run_id}.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        summary = %summary_path.display(),
        manifest = %manifest_path.display(),
        "evaluation completed"
    );

    Ok(())
}

fn open_store(args: &EvalArgs) -> Result<Box<dyn VectorStore>> {
    match args.store_kind {
        StoreKind::Sqlite => {
            let db_path = args.store.resolved_db_path();
            let store = SqliteVectorStore::open_existing(&db_path, &args.store.table_name)?;
            info!(
                path = %db_path.display(),
                table = %store.table_name(),
                documents = store.document_count()?,
                "opened vector store"
            );
            Ok(Box::new(store))
        }
        StoreKind::Replay => {
            let path = args
                .replay_path
                .as_ref()
                .context("--replay-path is required with --store-kind replay")?;
            Ok(Box::new(ReplayStore::from_path(path)?))
        }
    }
}

fn search_log_for(args: &EvalArgs) -> Option<SearchLog> {
    args.search_log_path.as_ref().map(|_| SearchLog::new())
}

fn default_summary_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("summary.json")
}
