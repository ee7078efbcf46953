//! SQLite storage backend for the relay.
//!
//! Every written value is one row keyed by its full path. Reads of a path
//! without its own row assemble the rows below it into one JSON object.

pub mod models;

use crate::error::RelayError;
use keyrelay_core::relay::tree::{ancestors, assemble};
use models::StoredDocument;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Thread-safe relay storage.
#[derive(Clone)]
pub struct RelayStorage {
    conn: Arc<Mutex<Connection>>,
}

impl RelayStorage {
    pub fn open(path: &Path) -> Result<Self, anyhow::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, anyhow::Error> {
        let conn = Connection::open_in_memory()?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> Result<(), anyhow::Error> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_updated_at
                ON documents(updated_at);",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RelayError> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Internal(format!("Lock error: {}", e)))
    }

    /// Document at `path`, or the documents below it assembled into one object.
    pub fn get_document(&self, path: &str) -> Result<Option<Value>, RelayError> {
        let conn = self.conn()?;
        let prefix = format!("{}/", path);
        let mut stmt = conn.prepare(
            "SELECT path, value FROM documents
             WHERE path = ?1 OR substr(path, 1, ?2) = ?3
             ORDER BY path",
        )?;
        let rows = stmt
            .query_map(params![path, prefix.len() as i64, prefix], |row| {
                Ok(StoredDocument {
                    path: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut parsed = Vec::with_capacity(rows.len());
        for doc in rows {
            let value: Value = serde_json::from_str(&doc.value).map_err(|e| {
                RelayError::Internal(format!("Corrupt document at {}: {}", doc.path, e))
            })?;
            parsed.push((doc.path, value));
        }

        Ok(assemble(
            path,
            parsed.iter().map(|(p, v)| (p.as_str(), v)),
        ))
    }

    /// Replace the subtree at `path` with `value`. Writing `null` deletes.
    pub fn put_document(&self, path: &str, value: &Value, now: i64) -> Result<(), RelayError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        delete_subtree(&tx, path)?;
        if !value.is_null() {
            for ancestor in ancestors(path) {
                tx.execute("DELETE FROM documents WHERE path = ?1", [ancestor])?;
            }
            tx.execute(
                "INSERT INTO documents (path, value, updated_at) VALUES (?1, ?2, ?3)",
                params![path, value.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove `path` and everything below it. Returns the number of documents removed.
    pub fn delete_document(&self, path: &str) -> Result<usize, RelayError> {
        let conn = self.conn()?;
        Ok(delete_subtree(&conn, path)?)
    }

    /// Drop documents last written before `cutoff` (unix seconds).
    pub fn prune_older_than(&self, cutoff: i64) -> Result<usize, RelayError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM documents WHERE updated_at < ?1", [cutoff])?)
    }

    #[cfg(test)]
    pub fn document_count(&self) -> Result<usize, RelayError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn delete_subtree(conn: &Connection, path: &str) -> Result<usize, rusqlite::Error> {
    let prefix = format!("{}/", path);
    conn.execute(
        "DELETE FROM documents WHERE path = ?1 OR substr(path, 1, ?2) = ?3",
        params![path, prefix.len() as i64, prefix],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_roundtrip() {
        let storage = RelayStorage::in_memory().unwrap();
        storage
            .put_document("requests/ROOM/1", &json!({"type": "pairing"}), 10)
            .unwrap();
        assert_eq!(
            storage.get_document("requests/ROOM/1").unwrap(),
            Some(json!({"type": "pairing"}))
        );
        assert_eq!(storage.get_document("requests/ROOM/2").unwrap(), None);
    }

    #[test]
    fn room_listing_assembles_children() {
        let storage = RelayStorage::in_memory().unwrap();
        storage.put_document("requests/ROOM/1", &json!("a"), 1).unwrap();
        storage.put_document("requests/ROOM/2", &json!("b"), 1).unwrap();
        storage.put_document("requests/ROOM_2/1", &json!("x"), 1).unwrap();

        assert_eq!(
            storage.get_document("requests/ROOM").unwrap(),
            Some(json!({"1": "a", "2": "b"}))
        );
    }

    #[test]
    fn underscore_is_not_a_wildcard() {
        let storage = RelayStorage::in_memory().unwrap();
        storage.put_document("a_c/1", &json!(1), 1).unwrap();
        assert_eq!(storage.get_document("abc").unwrap(), None);
        assert_eq!(storage.delete_document("abc").unwrap(), 0);
        assert_eq!(storage.document_count().unwrap(), 1);
    }

    #[test]
    fn put_replaces_subtree_and_leaf_ancestors() {
        let storage = RelayStorage::in_memory().unwrap();
        storage.put_document("requests/ROOM", &json!("leaf"), 1).unwrap();
        storage.put_document("requests/ROOM/1", &json!(1), 1).unwrap();
        assert_eq!(storage.document_count().unwrap(), 1);

        storage.put_document("requests/ROOM", &json!({"n": 2}), 1).unwrap();
        assert_eq!(storage.get_document("requests/ROOM/1").unwrap(), None);
        assert_eq!(storage.document_count().unwrap(), 1);
    }

    #[test]
    fn null_put_and_delete_remove() {
        let storage = RelayStorage::in_memory().unwrap();
        storage.put_document("registrations/ROOM", &json!({"data": "x"}), 1).unwrap();
        storage.put_document("registrations/ROOM", &Value::Null, 2).unwrap();
        assert_eq!(storage.document_count().unwrap(), 0);

        storage.put_document("requests/ROOM/1", &json!(1), 1).unwrap();
        storage.put_document("requests/ROOM/2", &json!(2), 1).unwrap();
        assert_eq!(storage.delete_document("requests/ROOM").unwrap(), 2);
        assert_eq!(storage.delete_document("requests/ROOM").unwrap(), 0);
    }

    #[test]
    fn prune_by_age() {
        let storage = RelayStorage::in_memory().unwrap();
        storage.put_document("requests/ROOM/old", &json!(1), 100).unwrap();
        storage.put_document("requests/ROOM/new", &json!(2), 500).unwrap();

        assert_eq!(storage.prune_older_than(300).unwrap(), 1);
        assert_eq!(
            storage.get_document("requests/ROOM").unwrap(),
            Some(json!({"new": 2}))
        );
    }

    #[test]
    fn file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        {
            let storage = RelayStorage::open(&path).unwrap();
            storage.put_document("x/y", &json!(true), 1).unwrap();
        }
        let reopened = RelayStorage::open(&path).unwrap();
        assert_eq!(reopened.get_document("x/y").unwrap(), Some(json!(true)));
    }
}
