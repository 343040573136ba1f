//! Change-feed request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of change a sync item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
  EntryPublished,
  EntryUnpublished,
  EntryDeleted,
  AssetPublished,
  AssetUnpublished,
  AssetDeleted,
  ContentTypeDeleted,
  /// Event types this client does not know about yet
  #[serde(other)]
  Unknown,
}

impl SyncEventType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::EntryPublished => "entry_published",
      Self::EntryUnpublished => "entry_unpublished",
      Self::EntryDeleted => "entry_deleted",
      Self::AssetPublished => "asset_published",
      Self::AssetUnpublished => "asset_unpublished",
      Self::AssetDeleted => "asset_deleted",
      Self::ContentTypeDeleted => "content_type_deleted",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for SyncEventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for SyncEventType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    serde_json::from_value::<Self>(Value::String(s.to_string()))
      .ok()
      .filter(|t| *t != Self::Unknown)
      .ok_or_else(|| format!("unknown sync event type '{}'", s))
  }
}

/// One record of the change feed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncItem {
  #[serde(rename = "type")]
  pub event: SyncEventType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type_uid: Option<String>,
  /// Entity snapshot (new state for publishes, old state for deletes)
  #[serde(default)]
  pub data: Value,
}

impl SyncItem {
  /// Identity of the entity this item is about: content type, entity uid
  /// and, when the item carries one, its locale. Each localized publish of an
  /// entry is its own entity. Items without a `data.uid` have no identity.
  pub fn identity(&self) -> Option<String> {
    let uid = self.data.get("uid")?.as_str()?;
    let content_type = self.content_type_uid.as_deref().unwrap_or_default();
    match self.locale() {
      Some(locale) => Some(format!("{}/{}/{}", content_type, uid, locale)),
      None => Some(format!("{}/{}", content_type, uid)),
    }
  }

  /// Locale of the item: `data.publish_details.locale`, else `data.locale`.
  pub fn locale(&self) -> Option<&str> {
    self
      .data
      .get("publish_details")
      .and_then(|details| details.get("locale"))
      .and_then(Value::as_str)
      .or_else(|| self.data.get("locale").and_then(Value::as_str))
  }
}

/// Where a sync pass stands after a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCursor {
  /// More pages remain in this pass.
  Pagination(String),
  /// The pass is complete; start the next delta sync from here.
  Sync(String),
}

/// One page of the change feed, as sent on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncPage {
  #[serde(default)]
  pub items: Vec<SyncItem>,
  pub sync_token: Option<String>,
  pub pagination_token: Option<String>,
  pub total_count: Option<u64>,
}

impl SyncPage {
  /// Cursor carried by this page. A pagination token wins if both are present.
  pub fn cursor(&self) -> Option<SyncCursor> {
    match (&self.pagination_token, &self.sync_token) {
      (Some(token), _) => Some(SyncCursor::Pagination(token.clone())),
      (None, Some(token)) => Some(SyncCursor::Sync(token.clone())),
      (None, None) => None,
    }
  }
}

/// Result of a drain: accumulated items plus the token that ended it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncBatch {
  pub items: Vec<SyncItem>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sync_token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pagination_token: Option<String>,
}

impl SyncBatch {
  pub fn cursor(&self) -> Option<SyncCursor> {
    match (&self.pagination_token, &self.sync_token) {
      (Some(token), _) => Some(SyncCursor::Pagination(token.clone())),
      (None, Some(token)) => Some(SyncCursor::Sync(token.clone())),
      (None, None) => None,
    }
  }

  /// Whether this batch ended a complete pass.
  pub fn is_complete(&self) -> bool {
    matches!(self.cursor(), Some(SyncCursor::Sync(_)))
  }
}

impl From<SyncPage> for SyncBatch {
  fn from(page: SyncPage) -> Self {
    Self {
      items: page.items,
      sync_token: page.sync_token,
      pagination_token: page.pagination_token,
    }
  }
}

/// Parameters of a sync request, in caller (`camelCase`) convention.
///
/// Keys are normalised to the wire convention by the engine on every page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncParams {
  params: Map<String, Value>,
}

impl SyncParams {
  /// A fresh, initialising sync.
  pub fn new() -> Self {
    Self::default()
  }

  /// Continue a delta sync from a previous sync token.
  pub fn from_sync_token(token: impl Into<String>) -> Self {
    Self::new().param("syncToken", token.into())
  }

  /// Resume a pass from a pagination token.
  pub fn from_pagination_token(token: impl Into<String>) -> Self {
    Self::new().param("paginationToken", token.into())
  }

  pub fn content_type_uid(self, uid: impl Into<String>) -> Self {
    self.param("contentTypeUid", uid.into())
  }

  pub fn locale(self, locale: impl Into<String>) -> Self {
    self.param("locale", locale.into())
  }

  /// Only changes at or after this ISO 8601 date.
  pub fn start_date(self, date: impl Into<String>) -> Self {
    self.param("startDate", date.into())
  }

  /// Restrict the feed to an event type. May be called repeatedly.
  pub fn event_type(mut self, event: SyncEventType) -> Self {
    let entry = self
      .params
      .entry("type")
      .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(types) = entry {
      types.push(Value::String(event.as_str().to_string()));
    }
    self
  }

  /// Any other parameter.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.params.get(key)
  }

  pub fn into_map(self) -> Map<String, Value> {
    self.params
  }
}
