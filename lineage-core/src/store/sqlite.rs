//! SQLite-backed record store
//!
//! One row per `(repository_id, function_key, fingerprint)`; the full record
//! is stored as JSON next to the columns used for lookup and ordering.

use super::{sort_history, IntelligenceStore, RecordKey};
use crate::error::StoreError;
use crate::model::FunctionIntelligence;
use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS function_intelligence (
    repository_id  TEXT NOT NULL,
    function_key   TEXT NOT NULL,
    fingerprint    TEXT NOT NULL,
    function_name  TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    format_version INTEGER NOT NULL,
    record         TEXT NOT NULL,
    PRIMARY KEY (repository_id, function_key, fingerprint)
);
CREATE INDEX IF NOT EXISTS idx_function_intelligence_name
    ON function_intelligence (repository_id, function_name, created_at);
";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened intelligence store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection off the async runtime
    async fn interact<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn decode(json: String) -> Result<FunctionIntelligence, StoreError> {
    Ok(serde_json::from_str(&json)?)
}

#[async_trait]
impl IntelligenceStore for SqliteStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<FunctionIntelligence>, StoreError> {
        let key = key.clone();
        self.interact(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT record FROM function_intelligence
                     WHERE repository_id = ?1 AND function_key = ?2 AND fingerprint = ?3",
                    params![key.repository_id, key.function_key, key.fingerprint],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(decode).transpose()
        })
        .await
    }

    async fn put(&self, record: &FunctionIntelligence) -> Result<(), StoreError> {
        let key = RecordKey::for_function(&record.function);
        let function_name = record.function.function_name.clone();
        let created_at = record
            .created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true);
        let format_version = record.format_version;
        let json = serde_json::to_string(record)?;

        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO function_intelligence
                     (repository_id, function_key, fingerprint, function_name,
                      created_at, format_version, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (repository_id, function_key, fingerprint) DO UPDATE SET
                     function_name = excluded.function_name,
                     created_at = excluded.created_at,
                     format_version = excluded.format_version,
                     record = excluded.record",
                params![
                    key.repository_id,
                    key.function_key,
                    key.fingerprint,
                    function_name,
                    created_at,
                    format_version,
                    json
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn history(
        &self,
        repository_id: &str,
        function_name: &str,
    ) -> Result<Vec<FunctionIntelligence>, StoreError> {
        let repository_id = repository_id.to_string();
        let function_name = function_name.to_string();
        let mut records = self
            .interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT record FROM function_intelligence
                     WHERE repository_id = ?1 AND function_name = ?2
                     ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(params![repository_id, function_name], |row| {
                    row.get::<_, String>(0)
                })?;
                let mut records = Vec::new();
                for json in rows {
                    records.push(decode(json?)?);
                }
                Ok(records)
            })
            .await?;
        sort_history(&mut records);
        Ok(records)
    }
}
