//! SQLite-backed document store.
//!
//! One `documents` table holds every collection. Bodies are JSON text,
//! versions are bumped inside the same statement or transaction that
//! writes the body.

use super::document_store::{DocumentStore, Result, StoreError, StoredDocument};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Initialize the documents table if it doesn't exist.
pub fn init_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        [],
    )
    .map_err(db_err)?;
    Ok(())
}

impl SqliteDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn parse_body(id: String, version: i64, json: String) -> Result<StoredDocument> {
    let body: Value =
        serde_json::from_str(&json).map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(StoredDocument {
        id,
        version: version.max(0) as u64,
        body,
    })
}

fn current_version(conn: &Connection, collection: &str, id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT version FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let conn = self.conn.lock();
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        match row {
            Some((version, json)) => Ok(Some(parse_body(id.to_string(), version, json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64> {
        let json = serde_json::to_string(&body)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (collection, id, body, version, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                version = documents.version + 1,
                updated_at = excluded.updated_at",
            params![collection, id, json, now],
        )
        .map_err(db_err)?;

        let version = current_version(&conn, collection, id)?.unwrap_or(1);
        Ok(version.max(0) as u64)
    }

    async fn put_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        body: Value,
    ) -> Result<u64> {
        let json = serde_json::to_string(&body)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let found = current_version(&tx, collection, id)?.unwrap_or(0).max(0) as u64;
        if found != expected_version {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: expected_version,
                found,
            });
        }

        let next = (found + 1) as i64;
        if found == 0 {
            tx.execute(
                "INSERT INTO documents (collection, id, body, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![collection, id, json, next, now],
            )
            .map_err(db_err)?;
        } else {
            tx.execute(
                "UPDATE documents SET body = ?3, version = ?4, updated_at = ?5
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, json, next, now],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        Ok(next as u64)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, version, body FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, version, json)| parse_body(id, version, json))
            .collect()
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows_affected = conn
            .execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .map_err(db_err)?;
        Ok(rows_affected > 0)
    }
}
