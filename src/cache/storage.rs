//! Persistence store trait and its SQLite implementation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;

/// Scope used for keys that are not tied to a content type (assets, taxonomies).
pub const GLOBAL_SCOPE: &str = "";

/// Key/value store with per-record time-to-live.
///
/// `scope` is the content type uid, so an implementation can bucket or evict
/// per content type. Records past their TTL read as absent.
pub trait PersistenceStore: Send + Sync {
  /// Read a live record.
  fn get(&self, key: &str, scope: &str) -> Result<Option<Value>, StoreError>;

  /// Write (or overwrite) a record that expires after `ttl`.
  fn set(&self, key: &str, value: &Value, scope: &str, ttl: Duration) -> Result<(), StoreError>;

  /// Remove a record; removing a missing record is not an error.
  fn remove(&self, key: &str, scope: &str) -> Result<(), StoreError>;

  /// Remove every record in `scope`, or everything when `scope` is `None`.
  /// Returns the number of records removed.
  fn clear(&self, scope: Option<&str>) -> Result<usize, StoreError>;
}

impl<S: PersistenceStore + ?Sized> PersistenceStore for std::sync::Arc<S> {
  fn get(&self, key: &str, scope: &str) -> Result<Option<Value>, StoreError> {
    (**self).get(key, scope)
  }

  fn set(&self, key: &str, value: &Value, scope: &str, ttl: Duration) -> Result<(), StoreError> {
    (**self).set(key, value, scope, ttl)
  }

  fn remove(&self, key: &str, scope: &str) -> Result<(), StoreError> {
    (**self).remove(key, scope)
  }

  fn clear(&self, scope: Option<&str>) -> Result<usize, StoreError> {
    (**self).clear(scope)
  }
}

/// Store that doesn't keep anything.
/// Used with the `ignore_cache` policy.
pub struct NoopStore;

impl PersistenceStore for NoopStore {
  fn get(&self, _key: &str, _scope: &str) -> Result<Option<Value>, StoreError> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &Value, _scope: &str, _ttl: Duration) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str, _scope: &str) -> Result<(), StoreError> {
    Ok(())
  }

  fn clear(&self, _scope: Option<&str>) -> Result<usize, StoreError> {
    Ok(0)
  }
}

/// SQLite-based persistence store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_records (
    scope TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    data BLOB NOT NULL,
    written_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (scope, cache_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_records_expiry ON cache_records(expires_at);
"#;

impl SqliteStore {
  /// Open (or create) a store at the default location.
  pub fn open_default() -> Result<Self, StoreError> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) a store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Backend(format!(
          "failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Backend(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Store that lives only as long as the process.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Backend("could not determine data directory".to_string()))?;

    Ok(data_dir.join("stackq").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::Poisoned)
  }

  /// Drop every expired record. Returns how many were removed.
  pub fn purge_expired(&self) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM cache_records WHERE expires_at <= ?",
      params![Utc::now().timestamp()],
    )?;
    Ok(removed)
  }
}

impl PersistenceStore for SqliteStore {
  fn get(&self, key: &str, scope: &str) -> Result<Option<Value>, StoreError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, i64)> = conn
      .query_row(
        "SELECT data, expires_at FROM cache_records WHERE scope = ? AND cache_key = ?",
        params![scope, key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((_, expires_at)) if expires_at <= Utc::now().timestamp() => {
        debug!(key, scope, "cache record expired");
        conn.execute(
          "DELETE FROM cache_records WHERE scope = ? AND cache_key = ?",
          params![scope, key],
        )?;
        Ok(None)
      }
      Some((data, _)) => Ok(Some(serde_json::from_slice(&data)?)),
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &Value, scope: &str, ttl: Duration) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value)?;
    let now = Utc::now().timestamp();
    let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_records (scope, cache_key, data, written_at, expires_at)
       VALUES (?, ?, ?, ?, ?)",
      params![scope, key, data, now, expires_at],
    )?;

    Ok(())
  }

  fn remove(&self, key: &str, scope: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM cache_records WHERE scope = ? AND cache_key = ?",
      params![scope, key],
    )?;
    Ok(())
  }

  fn clear(&self, scope: Option<&str>) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let removed = match scope {
      Some(scope) => conn.execute("DELETE FROM cache_records WHERE scope = ?", params![scope])?,
      None => conn.execute("DELETE FROM cache_records", [])?,
    };
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const DAY: Duration = Duration::from_secs(86_400);

  #[test]
  fn test_set_then_get() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .set("blog_key", &json!({"title": "Hello"}), "blog", DAY)
      .unwrap();

    assert_eq!(
      store.get("blog_key", "blog").unwrap(),
      Some(json!({"title": "Hello"}))
    );
    assert_eq!(store.get("blog_key", "other").unwrap(), None);
  }

  #[test]
  fn test_overwrite_replaces_value() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("k", &json!(1), "ct", DAY).unwrap();
    store.set("k", &json!(2), "ct", DAY).unwrap();
    assert_eq!(store.get("k", "ct").unwrap(), Some(json!(2)));
  }

  #[test]
  fn test_zero_ttl_reads_as_absent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("k", &json!("stale"), "ct", Duration::ZERO).unwrap();
    assert_eq!(store.get("k", "ct").unwrap(), None);
    assert_eq!(store.purge_expired().unwrap(), 0);
  }

  #[test]
  fn test_remove_and_clear() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("a", &json!(1), "blog", DAY).unwrap();
    store.set("b", &json!(2), "blog", DAY).unwrap();
    store.set("c", &json!(3), "page", DAY).unwrap();

    store.remove("a", "blog").unwrap();
    assert_eq!(store.get("a", "blog").unwrap(), None);

    assert_eq!(store.clear(Some("blog")).unwrap(), 1);
    assert_eq!(store.get("c", "page").unwrap(), Some(json!(3)));
    assert_eq!(store.clear(None).unwrap(), 1);
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set("k", &json!({"n": 1}), GLOBAL_SCOPE, DAY).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("k", GLOBAL_SCOPE).unwrap(), Some(json!({"n": 1})));
  }

  #[test]
  fn test_noop_store_always_misses() {
    let store = NoopStore;
    store.set("k", &json!(1), "ct", DAY).unwrap();
    assert_eq!(store.get("k", "ct").unwrap(), None);
  }
}
