use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "rageval",
    version,
    about = "Vector retrieval and Hit@K / MRR evaluation tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Search(SearchArgs),
    Eval(EvalArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, env = "RAGEVAL_CACHE_ROOT", default_value = ".cache/rageval")]
    pub cache_root: PathBuf,

    #[arg(long, env = "RAGEVAL_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "RAGEVAL_TABLE_NAME", default_value = "embeddings")]
    pub table_name: String,
}

impl StoreArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("rageval_index.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_root.join("manifests")
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub dataset_path: PathBuf,

    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    /// Lower bound of the document `created_at` window (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Upper bound of the document `created_at` window (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub search_log_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    Sqlite,
    Replay,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Replay => "replay",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = "groundtruth.json")]
    pub groundtruth_path: PathBuf,

    #[arg(long, default_value = "topk_eval_results.csv")]
    pub output_path: PathBuf,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,

    #[arg(
        long = "k",
        value_delimiter = ',',
        default_value = "1,3,5",
        value_parser = parse_positive_k
    )]
    pub ks: Vec<usize>,

    #[arg(long, value_parser = parse_positive_k)]
    pub sample_size: Option<usize>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = StoreKind::Sqlite)]
    pub store_kind: StoreKind,

    /// Search log consumed by `--store-kind replay`.
    #[arg(long)]
    pub replay_path: Option<PathBuf>,

    /// Export every search issued during the run to this path.
    #[arg(long)]
    pub search_log_path: Option<PathBuf>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,

    /// Stop between queries once this many seconds have elapsed.
    #[arg(long)]
    pub max_duration_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

fn parse_positive_k(raw: &str) -> Result<usize, String> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|err| format!("invalid value '{raw}': {err}"))?;
    if value == 0 {
        return Err(format!("value must be a positive integer, got '{raw}'"));
    }
    Ok(value)
}
