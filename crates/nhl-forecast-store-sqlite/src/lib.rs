#![allow(clippy::missing_errors_doc)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nhl_forecast_core::store::{appended_array_text, ensure_capacity, DEFAULT_MAX_VALUE_BYTES};
use nhl_forecast_core::{format_rfc3339, now_utc, KeyValueStore, StoreError};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

const KV_MIGRATION_VERSION: i64 = 1;

const SCHEMA_KV_V1: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// Durable key-value store for projections and the history ledger.
pub struct SqliteKvStore {
    conn: Connection,
    max_value_bytes: usize,
}

impl SqliteKvStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self {
            conn,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        })
    }

    /// Opens `path` and applies migrations.
    pub fn open_and_migrate(path: &Path, max_value_bytes: usize) -> Result<Self> {
        let store = Self::open(path)?.with_max_value_bytes(max_value_bytes);
        store.migrate()?;
        Ok(store)
    }

    #[must_use]
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_KV_V1)
            .context("failed to apply kv schema")?;

        let now = timestamp()?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![KV_MIGRATION_VERSION, now],
            )
            .context("failed to register kv schema migration")?;

        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .context("failed to read schema version")
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_entries ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list kv keys")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read key {key}"))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let now = timestamp()?;
        self.conn
            .execute(
                "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete key {key}"))?;
        Ok(())
    }

    fn append(&mut self, key: &str, item: &Value) -> std::result::Result<usize, StoreError> {
        let limit = self.max_value_bytes;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| backend(&anyhow!(err).context("failed to start append transaction")))?;

        let current: Option<String> = tx
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| backend(&anyhow!(err).context(format!("failed to read key {key}"))))?;

        let (text, len) = appended_array_text(current.as_deref(), item)?;
        ensure_capacity(key, &text, limit)?;

        let now = timestamp().map_err(|err| backend(&err))?;
        tx.execute(
            "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, text, now],
        )
        .map_err(|err| backend(&anyhow!(err).context(format!("failed to append to key {key}"))))?;

        tx.commit()
            .map_err(|err| backend(&anyhow!(err).context("failed to commit append transaction")))?;
        Ok(len)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        self.read(key).map_err(|err| backend(&err))
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        ensure_capacity(key, value, self.max_value_bytes)?;
        self.write(key, value).map_err(|err| backend(&err))
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), StoreError> {
        self.delete(key).map_err(|err| backend(&err))
    }

    fn append_to_array(&mut self, key: &str, item: &Value) -> std::result::Result<usize, StoreError> {
        self.append(key, item)
    }
}

fn timestamp() -> Result<String> {
    format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))
}

fn backend(err: &anyhow::Error) -> StoreError {
    let message = format!("{err:#}");
    tracing::debug!(error = %message, "sqlite store error");
    StoreError::Backend(message)
}
