//! In-process persistence store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::storage::PersistenceStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct MemoryRecord {
  value: Value,
  expires_at: DateTime<Utc>,
}

/// HashMap-backed store, keyed by `(scope, key)`. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: Mutex<HashMap<(String, String), MemoryRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of records currently held, expired or not.
  pub fn len(&self) -> Result<usize, StoreError> {
    let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(records.len())
  }

  pub fn is_empty(&self) -> Result<bool, StoreError> {
    Ok(self.len()? == 0)
  }
}

impl PersistenceStore for MemoryStore {
  fn get(&self, key: &str, scope: &str) -> Result<Option<Value>, StoreError> {
    let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
    let id = (scope.to_string(), key.to_string());

    match records.get(&id) {
      Some(record) if record.expires_at <= Utc::now() => {
        records.remove(&id);
        Ok(None)
      }
      Some(record) => Ok(Some(record.value.clone())),
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &Value, scope: &str, ttl: Duration) -> Result<(), StoreError> {
    let expires_at = chrono::Duration::from_std(ttl)
      .ok()
      .and_then(|ttl| Utc::now().checked_add_signed(ttl))
      .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
    records.insert(
      (scope.to_string(), key.to_string()),
      MemoryRecord {
        value: value.clone(),
        expires_at,
      },
    );
    Ok(())
  }

  fn remove(&self, key: &str, scope: &str) -> Result<(), StoreError> {
    let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
    records.remove(&(scope.to_string(), key.to_string()));
    Ok(())
  }

  fn clear(&self, scope: Option<&str>) -> Result<usize, StoreError> {
    let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
    let before = records.len();
    match scope {
      Some(scope) => records.retain(|(s, _), _| s != scope),
      None => records.clear(),
    }
    Ok(before - records.len())
  }
}
