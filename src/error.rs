use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("malformed groundtruth {path}: {reason}")]
    MalformedGroundtruth { path: PathBuf, reason: String },

    #[error("failed to write report {path}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl EvalError {
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedGroundtruth {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn report_write(path: &Path, source: impl Into<csv::Error>) -> Self {
        Self::ReportWrite {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("vector store query failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("no recorded results for query: {0}")]
    NotRecorded(String),
}
