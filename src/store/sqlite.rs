use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use rusqlite::{Connection, OpenFlags, params};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RetrievalError;
use crate::semantic::{
    SemanticModelConfig, cosine_distance, decode_embedding_blob, default_model_config,
    embed_text_local, embedding_text_hash, encode_embedding_blob,
};
use crate::util::ensure_parent_directory;

use super::{RawResults, ResultRow, TimeRange, VectorStore};

const CORE_COLUMNS: [&str; 5] = ["id", "metadata", "content", "embedding", "distance"];

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: String,
    pub metadata: Value,
    pub contents: String,
    pub created_at: String,
}

pub struct SqliteVectorStore {
    connection: Connection,
    table_name: String,
    model: SemanticModelConfig,
}

impl SqliteVectorStore {
    pub fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        ensure_parent_directory(db_path)?;
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open vector store: {}", db_path.display()))?;
        configure_connection(&connection)?;

        Self::from_connection(connection, table_name)
    }

    pub fn open_existing(db_path: &Path, table_name: &str) -> Result<Self> {
        if !db_path.exists() {
            bail!(
                "vector store {} does not exist; run `rageval ingest` first",
                db_path.display()
            );
        }
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open vector store: {}", db_path.display()))?;

        Self::from_existing_connection(connection, table_name)
            .with_context(|| format!("vector store {} is not usable", db_path.display()))
    }

    pub fn from_connection(connection: Connection, table_name: &str) -> Result<Self> {
        let table_name = validate_table_name(table_name)?;
        ensure_schema(&connection, &table_name)?;
        Ok(Self::attach(connection, table_name))
    }

    pub fn from_existing_connection(connection: Connection, table_name: &str) -> Result<Self> {
        let table_name = validate_table_name(table_name)?;
        if !table_exists(&connection, &table_name)? {
            bail!("table '{table_name}' not found; check --table-name or run `rageval ingest`");
        }
        Ok(Self::attach(connection, table_name))
    }

    fn attach(connection: Connection, table_name: String) -> Self {
        Self {
            connection,
            table_name,
            model: default_model_config(),
        }
    }

    pub fn model(&self) -> &SemanticModelConfig {
        &self.model
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn insert_documents(&mut self, documents: &[NewDocument]) -> Result<usize> {
        let sql = format!(
            "
            INSERT INTO {table}(id, metadata, contents, embedding, embedding_dim, text_hash, model_id, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
              metadata=excluded.metadata,
              contents=excluded.contents,
              embedding=excluded.embedding,
              embedding_dim=excluded.embedding_dim,
              text_hash=excluded.text_hash,
              model_id=excluded.model_id,
              created_at=excluded.created_at
            ",
            table = self.table_name
        );

        let tx = self.connection.transaction()?;
        let mut inserted = 0usize;
        {
            let mut statement = tx.prepare(&sql)?;
            for document in documents {
                let embedding = embed_text_local(&document.contents, self.model.dimensions);
                statement.execute(params![
                    document.id,
                    document.metadata.to_string(),
                    document.contents,
                    encode_embedding_blob(&embedding),
                    self.model.dimensions as i64,
                    embedding_text_hash(&document.contents),
                    self.model.model_id,
                    document.created_at,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    pub fn document_count(&self) -> Result<i64> {
        let count = self.connection.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table_name),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn scan_candidates(
        &self,
        query: &str,
        time_range: Option<&TimeRange>,
    ) -> Result<Vec<ScoredRow>, RetrievalError> {
        let query_embedding = embed_text_local(query, self.model.dimensions);
        let mut statement = self.connection.prepare(&format!(
            "
            SELECT id, metadata, contents, embedding, embedding_dim
            FROM {}
            WHERE
              (?1 IS NULL OR created_at >= ?1)
              AND (?2 IS NULL OR created_at <= ?2)
            ",
            self.table_name
        ))?;

        let mut rows = statement.query(params![
            time_range.and_then(TimeRange::start_key),
            time_range.and_then(TimeRange::end_key),
        ])?;

        let mut out = Vec::<ScoredRow>::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let row_dim = row.get::<_, i64>(4)? as usize;
            let blob: Vec<u8> = row.get(3)?;
            let Some(embedding) = (row_dim == self.model.dimensions)
                .then(|| decode_embedding_blob(&blob, row_dim))
                .flatten()
            else {
                skipped += 1;
                continue;
            };

            out.push(ScoredRow {
                distance: cosine_distance(&query_embedding, &embedding),
                id,
                metadata: row.get(1)?,
                contents: row.get(2)?,
                embedding,
            });
        }

        if skipped > 0 {
            debug!(
                table = %self.table_name,
                skipped,
                "skipped rows with incompatible embeddings"
            );
        }

        Ok(out)
    }
}

impl VectorStore for SqliteVectorStore {
    fn search(
        &self,
        query: &str,
        limit: usize,
        time_range: Option<&TimeRange>,
    ) -> Result<RawResults, RetrievalError> {
        let mut candidates = self.scan_candidates(query, time_range)?;
        candidates.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.id.cmp(&right.id))
        });
        candidates.truncate(limit);

        Ok(RawResults::Rows(
            candidates.into_iter().map(ScoredRow::into_result_row).collect(),
        ))
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

struct ScoredRow {
    distance: f64,
    id: String,
    metadata: String,
    contents: String,
    embedding: Vec<f32>,
}

impl ScoredRow {
    fn into_result_row(self) -> ResultRow {
        let metadata = parse_stored_metadata(&self.metadata);

        let mut row = Map::new();
        row.insert("id".to_string(), Value::String(self.id));
        if let Value::Object(fields) = &metadata {
            for (key, value) in fields {
                if !CORE_COLUMNS.contains(&key.as_str()) {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
        row.insert("metadata".to_string(), metadata);
        row.insert("content".to_string(), Value::String(self.contents));
        row.insert(
            "embedding".to_string(),
            Value::Array(
                self.embedding
                    .into_iter()
                    .map(|value| Value::from(f64::from(value)))
                    .collect(),
            ),
        );
        row.insert("distance".to_string(), Value::from(self.distance));
        row
    }
}

fn parse_stored_metadata(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| {
        let mut fallback = Map::new();
        fallback.insert("raw".to_string(), Value::String(raw.to_string()));
        Value::Object(fallback)
    })
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn validate_table_name(raw: &str) -> Result<String> {
    let pattern =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").context("failed to compile table name regex")?;
    let trimmed = raw.trim();
    if !pattern.is_match(trimmed) {
        bail!("invalid table name '{raw}': expected an SQL identifier");
    }
    Ok(trimmed.to_string())
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to look up table {table_name}"))?;
    Ok(count > 0)
}

fn ensure_schema(connection: &Connection, table_name: &str) -> Result<()> {
    connection
        .execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table_name} (
              id TEXT PRIMARY KEY,
              metadata TEXT NOT NULL,
              contents TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              text_hash TEXT NOT NULL,
              model_id TEXT NOT NULL,
              created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table_name}_created_at
              ON {table_name}(created_at);
            "
        ))
        .with_context(|| format!("failed to ensure schema for table {table_name}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use serde_json::json;

    use super::{NewDocument, SqliteVectorStore, table_exists, validate_table_name};
    use crate::store::{RawResults, TimeRange, VectorStore};

    fn document(id: &str, doc_id: &str, contents: &str, created_at: &str) -> NewDocument {
        NewDocument {
            id: id.to_string(),
            metadata: json!({"doc_id": doc_id, "source": "fixture"}),
            contents: contents.to_string(),
            created_at: created_at.to_string(),
        }
    }

    fn seeded_store() -> SqliteVectorStore {
        let connection = Connection::open_in_memory().expect("in-memory db");
        let mut store =
            SqliteVectorStore::from_connection(connection, "embeddings").expect("store");
        let inserted = store
            .insert_documents(&[
                document(
                    "r1",
                    "D1",
                    "customs duty applies to imported goods",
                    "1980-01-01T00:00:00Z",
                ),
                document(
                    "r2",
                    "D2",
                    "marriage contracts must be registered",
                    "2005-06-01T00:00:00Z",
                ),
                document(
                    "r3",
                    "D3",
                    "labour code notice period for dismissal",
                    "2012-03-15T00:00:00Z",
                ),
            ])
            .expect("insert");
        assert_eq!(inserted, 3);
        store
    }

    #[test]
    fn search_returns_rows_ordered_by_ascending_distance() {
        let store = seeded_store();
        let results = store
            .search("customs duty on imported goods", 3, None)
            .expect("search");

        let RawResults::Rows(rows) = results else {
            panic!("sqlite store should return rows");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["doc_id"], json!("D1"));
        assert_eq!(rows[0]["metadata"]["source"], json!("fixture"));

        let distances = rows
            .iter()
            .map(|row| row["distance"].as_f64().expect("distance"))
            .collect::<Vec<f64>>();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn search_respects_limit_and_time_range() {
        let store = seeded_store();
        let limited = store.search("notice period", 1, None).expect("search");
        assert_eq!(limited.len(), 1);

        let range = TimeRange::from_bounds(Some("1979-04-09"), Some("2010-04-13"))
            .expect("range")
            .expect("bounded");
        let windowed = store
            .search("labour code notice period", 5, Some(&range))
            .expect("search");
        let RawResults::Rows(rows) = windowed else {
            panic!("sqlite store should return rows");
        };
        let ids = rows
            .iter()
            .map(|row| row["id"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<String>>();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"r3".to_string()));
    }

    #[test]
    fn reinserting_an_id_updates_in_place() {
        let mut store = seeded_store();
        store
            .insert_documents(&[document("r1", "D9", "updated text", "1990-01-01T00:00:00Z")])
            .expect("upsert");
        assert_eq!(store.document_count().expect("count"), 3);
    }

    #[test]
    fn opening_an_existing_store_requires_the_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("index.sqlite");
        {
            let mut store = SqliteVectorStore::open(&db_path, "embeddings").expect("create");
            store
                .insert_documents(&[document(
                    "r1",
                    "D1",
                    "customs duty applies to imported goods",
                    "1980-01-01T00:00:00Z",
                )])
                .expect("insert");
        }

        let err = SqliteVectorStore::open_existing(&db_path, "embedings")
            .err()
            .expect("misspelled table should be rejected");
        assert!(format!("{err:#}").contains("table 'embedings' not found"));

        let raw = Connection::open(&db_path).expect("raw connection");
        assert!(!table_exists(&raw, "embedings").expect("lookup"));
        assert!(table_exists(&raw, "embeddings").expect("lookup"));

        let store = SqliteVectorStore::open_existing(&db_path, "embeddings").expect("open");
        assert_eq!(store.document_count().expect("count"), 1);
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert_eq!(validate_table_name(" embeddings ").expect("valid"), "embeddings");
        assert!(validate_table_name("embeddings; DROP TABLE x").is_err());
        assert!(validate_table_name("1table").is_err());
    }
}
