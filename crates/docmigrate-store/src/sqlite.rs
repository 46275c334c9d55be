//! SQLite-backed document store.
//!
//! Documents live in a single `documents` table keyed by `(collection, id)`
//! with the field bag stored as a JSON object. A batch commit is one SQLite
//! transaction, so it lands completely or not at all.

use std::path::{Path, PathBuf};

use docmigrate_core::{Error, Fields, Result, Value};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use crate::{DocumentStore, DEFAULT_MAX_BATCH_SIZE};

/// SQLite document store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    max_batch_size: usize,
}

impl SqliteStore {
    /// Open or create the store at `db_path`, creating parent directories.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::Backend(e.to_string()))?;
        }

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        };

        info!(
            "SqliteStore initialized: {} documents, path={}",
            store.count_all()?,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Override the largest batch `commit` accepts.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Backend(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Seeding
    // ---------------------------------------------------------------

    /// Insert or replace a document. Generates an id when none is given.
    /// Returns the document id.
    pub fn insert(&self, collection: &str, id: Option<&str>, fields: &Fields) -> Result<String> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let json = serde_json::to_string(fields)?;
        let now = now_ms();

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO documents (collection, id, fields_json, created_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(collection, id) DO UPDATE SET fields_json = excluded.fields_json, updated_at = ?4",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![collection, id, json, now])
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Count documents in a collection.
    pub fn count(&self, collection: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(e.to_string()))
    }

    fn count_all(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    // Internal helpers

    fn row_to_snapshot(id: String, json: String, created_at: i64) -> Result<DocumentSnapshot> {
        let fields = parse_fields(&json)
            .ok_or_else(|| Error::Database(format!("document {} has non-object fields", id)))?;
        Ok(DocumentSnapshot {
            id,
            fields,
            created_at,
        })
    }

    fn apply_batch(conn: &mut Connection, batch: &[PendingWrite]) -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        let now = now_ms();
        {
            let mut select =
                tx.prepare_cached("SELECT fields_json FROM documents WHERE collection = ?1 AND id = ?2")?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO documents (collection, id, fields_json, created_at) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(collection, id) DO UPDATE SET fields_json = excluded.fields_json, updated_at = ?4",
            )?;

            for write in batch {
                let existing: Option<String> = select
                    .query_row(params![write.reference.collection, write.reference.id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                let mut fields = existing.as_deref().and_then(parse_fields).unwrap_or_default();
                write.apply_to(&mut fields);
                let json = Value::Object(fields).to_string();
                upsert.execute(params![
                    write.reference.collection,
                    write.reference.id,
                    json,
                    now
                ])?;
            }
        }
        tx.commit()
    }
}

impl DocumentStore for SqliteStore {
    fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<DocumentSnapshot>> {
        let rows: Vec<(String, String, i64)> = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, fields_json, created_at FROM documents WHERE collection = ?1 ORDER BY rowid",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(|e| Error::Database(e.to_string()))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::Database(e.to_string()))?;
            rows
        };

        let docs = rows
            .into_iter()
            .map(|(id, json, created_at)| Self::row_to_snapshot(id, json, created_at))
            .collect::<Result<Vec<_>>>()?;
        debug!("Listed {} documents from {}", docs.len(), collection);
        Ok(query.apply(docs))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>> {
        let row: Option<(String, i64)> = {
            let conn = self.conn.lock();
            let row = conn
                .prepare_cached(
                    "SELECT fields_json, created_at FROM documents WHERE collection = ?1 AND id = ?2",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .query_row(params![collection, id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()
                .map_err(|e| Error::Database(e.to_string()))?;
            row
        };
        row.map(|(json, created_at)| Self::row_to_snapshot(id.to_string(), json, created_at))
            .transpose()
    }

    fn commit(&self, batch: &[PendingWrite]) -> Result<()> {
        if batch.len() > self.max_batch_size {
            return Err(Error::BatchRejected {
                lost: batch.len(),
                reason: format!(
                    "batch of {} exceeds maximum of {}",
                    batch.len(),
                    self.max_batch_size
                ),
            });
        }

        let mut conn = self.conn.lock();
        Self::apply_batch(&mut conn, batch).map_err(|e| Error::BatchRejected {
            lost: batch.len(),
            reason: e.to_string(),
        })?;
        debug!("SqliteStore committed batch of {}", batch.len());
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

fn parse_fields(json: &str) -> Option<Fields> {
    match serde_json::from_str::<Value>(json).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
