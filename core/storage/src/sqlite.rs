//! SQLite-backed key-value store.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

use civicsync_common::{Error, Result};
use crate::store::{storage_err, KeyValueStore, UpdateFn};

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Key-value store on a single SQLite table.
///
/// Multi-key operations and read-modify-write updates each run in one
/// transaction. Every statement runs on the blocking thread pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            Error::Storage(format!(
                "Failed to open database at {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| storage_err("Failed to open in-memory database", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(KV_SCHEMA)
            .map_err(|e| storage_err("Failed to run migrations", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection off the async executor.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| storage_err("Database task failed", e))?
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(|e| storage_err("Failed to read key", e))
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value],
    )
    .map_err(|e| storage_err("Failed to write key", e))?;
    Ok(())
}

fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv WHERE key = ?", params![key])
        .map_err(|e| storage_err("Failed to delete key", e))?;
    Ok(())
}

fn in_transaction<T>(
    conn: &mut Connection,
    body: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction()
        .map_err(|e| storage_err("Failed to begin transaction", e))?;
    // Dropping `tx` without commit rolls back.
    let result = body(&tx)?;
    tx.commit()
        .map_err(|e| storage_err("Failed to commit transaction", e))?;
    Ok(result)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn| read_value(conn, &key)).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |conn| write_value(conn, &key, &value))
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |conn| delete_value(conn, &key)).await
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.blocking(move |conn| {
            in_transaction(conn, |tx| {
                keys.iter().try_for_each(|key| delete_value(tx, key))
            })
        })
        .await
    }

    async fn set_many(&self, entries: Vec<(String, String)>) -> Result<()> {
        self.blocking(move |conn| {
            in_transaction(conn, |tx| {
                entries
                    .iter()
                    .try_for_each(|(key, value)| write_value(tx, key, value))
            })
        })
        .await
    }

    async fn update(&self, key: &str, apply: UpdateFn) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn| {
            in_transaction(conn, |tx| {
                let next = apply(read_value(tx, &key)?)?;
                match &next {
                    Some(value) => write_value(tx, &key, value)?,
                    None => delete_value(tx, &key)?,
                }
                Ok(next)
            })
        })
        .await
    }
}
