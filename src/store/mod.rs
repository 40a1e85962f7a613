use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RetrievalError;
use crate::util::parse_utc_timestamp;

mod replay;
mod sqlite;

pub use replay::ReplayStore;
pub use sqlite::{NewDocument, SqliteVectorStore};

pub type ResultRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "records", rename_all = "snake_case")]
pub enum RawResults {
    Rows(Vec<ResultRow>),
    Tuples(Vec<Vec<Value>>),
    Objects(Vec<Value>),
}

impl RawResults {
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Tuples(tuples) => tuples.len(),
            Self::Objects(objects) => objects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncated(mut self, limit: usize) -> Self {
        match &mut self {
            Self::Rows(rows) => rows.truncate(limit),
            Self::Tuples(tuples) => tuples.truncate(limit),
            Self::Objects(objects) => objects.truncate(limit),
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn from_bounds(from: Option<&str>, to: Option<&str>) -> Result<Option<Self>> {
        if from.is_none() && to.is_none() {
            return Ok(None);
        }

        let start = from.map(parse_utc_timestamp).transpose()?;
        let end = to.map(parse_utc_timestamp).transpose()?;
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            bail!("time range start {start} is after end {end}");
        }

        Ok(Some(Self { start, end }))
    }

    pub(crate) fn start_key(&self) -> Option<String> {
        self.start
            .map(|value| value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub(crate) fn end_key(&self) -> Option<String> {
        self.end
            .map(|value| value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

pub trait VectorStore {
    fn search(
        &self,
        query: &str,
        limit: usize,
        time_range: Option<&TimeRange>,
    ) -> Result<RawResults, RetrievalError>;

    fn kind(&self) -> &'static str;
}
