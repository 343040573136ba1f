//! Drains the paginated change feed into one batch.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::types::{SyncBatch, SyncItem, SyncPage, SyncParams};
use crate::error::ClientResult;
use crate::params::normalize_map;

/// Performs one page fetch against the sync endpoint.
///
/// `params` always arrive with wire-convention (snake_case) keys.
pub trait SyncPageFetcher: Send + Sync {
  fn fetch_page<'a>(
    &'a self,
    params: &'a Map<String, Value>,
  ) -> BoxFuture<'a, ClientResult<SyncPage>>;
}

const CURSOR_KEYS: [&str; 4] = [
  "paginationToken",
  "pagination_token",
  "syncToken",
  "sync_token",
];

/// Follows pagination tokens until the feed hands out a sync token.
///
/// Holds no state between drains; each call starts from the parameters it is
/// given, so retrying a failed drain from the caller's last token is safe.
pub struct SyncEngine<F> {
  fetcher: F,
}

impl<F: SyncPageFetcher> SyncEngine<F> {
  pub fn new(fetcher: F) -> Self {
    Self { fetcher }
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  /// Fetch the first page and, when `recursive`, every page after it.
  ///
  /// With `recursive == false` the first page comes back as is, pagination
  /// token included. Any page failure aborts the drain and drops the items
  /// gathered so far.
  pub async fn drain(&self, params: SyncParams, recursive: bool) -> ClientResult<SyncBatch> {
    let first = first_page_params(params);
    let mut page = self.fetcher.fetch_page(&first).await?;
    debug!(items = page.items.len(), "fetched first sync page");

    if !recursive {
      return Ok(page.into());
    }

    let mut merged = MergedItems::new(std::mem::take(&mut page.items));
    let mut pages = 1usize;

    while let Some(token) = page.pagination_token.take() {
      let mut next = Map::new();
      next.insert("paginationToken".to_string(), Value::String(token));
      let next = normalize_map(next);

      page = self.fetcher.fetch_page(&next).await?;
      pages += 1;
      debug!(page = pages, items = page.items.len(), "fetched sync page");

      merged.overlay(std::mem::take(&mut page.items));
    }

    if page.sync_token.is_none() {
      warn!(pages, "sync feed ended without a sync token");
    }

    Ok(SyncBatch {
      items: merged.into_items(),
      sync_token: page.sync_token,
      pagination_token: None,
    })
  }
}

/// Wire parameters for the first page of a drain.
fn first_page_params(params: SyncParams) -> Map<String, Value> {
  let mut map = params.into_map();

  if !CURSOR_KEYS.iter().any(|k| map.contains_key(*k)) {
    map.insert("init".to_string(), Value::Bool(true));
  }

  if let Some(Value::Array(types)) = map.get("type") {
    let joined = types
      .iter()
      .map(|t| match t {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      })
      .collect::<Vec<_>>()
      .join(",");
    map.insert("type".to_string(), Value::String(joined));
  }

  normalize_map(map)
}

/// Items accumulated across pages, keyed by entity identity.
///
/// The first page is kept exactly as the feed sent it, so a one-page drain
/// returns the same items whether or not it is recursive. An item on a later
/// page replaces the last earlier item for the same entity in place; items
/// without an identity are always appended.
struct MergedItems {
  items: Vec<SyncItem>,
  positions: HashMap<String, usize>,
}

impl MergedItems {
  fn new(first: Vec<SyncItem>) -> Self {
    let positions = first
      .iter()
      .enumerate()
      .filter_map(|(pos, item)| item.identity().map(|id| (id, pos)))
      .collect();
    Self {
      items: first,
      positions,
    }
  }

  fn overlay(&mut self, page: Vec<SyncItem>) {
    for item in page {
      match item.identity() {
        Some(id) => match self.positions.get(&id) {
          Some(&pos) => self.items[pos] = item,
          None => {
            self.positions.insert(id, self.items.len());
            self.items.push(item);
          }
        },
        None => self.items.push(item),
      }
    }
  }

  fn into_items(self) -> Vec<SyncItem> {
    self.items
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{ClientError, TransportError};
  use crate::sync::SyncEventType;
  use serde_json::json;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Serves scripted pages in order and records the params of each call.
  struct ScriptedFetcher {
    pages: Mutex<VecDeque<ClientResult<SyncPage>>>,
    calls: Mutex<Vec<Map<String, Value>>>,
  }

  impl ScriptedFetcher {
    fn new(pages: Vec<ClientResult<SyncPage>>) -> Self {
      Self {
        pages: Mutex::new(pages.into()),
        calls: Mutex::new(Vec::new()),
      }
    }

    fn calls(&self) -> Vec<Map<String, Value>> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl SyncPageFetcher for ScriptedFetcher {
    fn fetch_page<'a>(
      &'a self,
      params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, ClientResult<SyncPage>> {
      Box::pin(async move {
        self.calls.lock().unwrap().push(params.clone());
        self
          .pages
          .lock()
          .unwrap()
          .pop_front()
          .expect("fetcher called more often than scripted")
      })
    }
  }

  fn page(items: Value, pagination: Option<&str>, sync: Option<&str>) -> ClientResult<SyncPage> {
    let mut body = json!({ "items": items });
    if let Some(token) = pagination {
      body["pagination_token"] = json!(token);
    }
    if let Some(token) = sync {
      body["sync_token"] = json!(token);
    }
    Ok(serde_json::from_value(body).unwrap())
  }

  fn entry(uid: &str, title: &str) -> Value {
    json!({
      "type": "entry_published",
      "content_type_uid": "blog",
      "data": {"uid": uid, "title": title}
    })
  }

  fn titles(batch: &SyncBatch) -> Vec<&str> {
    batch
      .items
      .iter()
      .map(|i| i.data["title"].as_str().unwrap())
      .collect()
  }

  #[tokio::test]
  async fn test_initial_request_marks_init_and_normalises_keys() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![page(
      json!([]),
      None,
      Some("s1"),
    )]));

    let params = SyncParams::new()
      .start_date("2024-01-01")
      .content_type_uid("blog")
      .event_type(SyncEventType::EntryPublished)
      .event_type(SyncEventType::EntryDeleted);
    engine.drain(params, true).await.unwrap();

    let calls = engine.fetcher().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
      Value::Object(calls[0].clone()),
      json!({
        "init": true,
        "start_date": "2024-01-01",
        "content_type_uid": "blog",
        "type": "entry_published,entry_deleted"
      })
    );
  }

  #[tokio::test]
  async fn test_token_request_is_not_init() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![page(
      json!([]),
      None,
      Some("s2"),
    )]));

    engine
      .drain(SyncParams::from_sync_token("s1"), true)
      .await
      .unwrap();

    let calls = engine.fetcher().calls();
    assert_eq!(Value::Object(calls[0].clone()), json!({"sync_token": "s1"}));
  }

  #[tokio::test]
  async fn test_single_page_returns_without_looping() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![page(
      json!([entry("e1", "one")]),
      None,
      Some("s1"),
    )]));

    let batch = engine.drain(SyncParams::new(), true).await.unwrap();

    assert_eq!(engine.fetcher().calls().len(), 1);
    assert_eq!(titles(&batch), vec!["one"]);
    assert_eq!(batch.sync_token.as_deref(), Some("s1"));
    assert!(batch.is_complete());
  }

  #[tokio::test]
  async fn test_non_recursive_stops_after_first_page() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([entry("e1", "one")]), Some("p1"), None),
      page(json!([entry("e2", "two")]), None, Some("s1")),
    ]));

    let batch = engine.drain(SyncParams::new(), false).await.unwrap();

    assert_eq!(engine.fetcher().calls().len(), 1);
    assert_eq!(titles(&batch), vec!["one"]);
    assert_eq!(batch.pagination_token.as_deref(), Some("p1"));
    assert_eq!(batch.sync_token, None);
  }

  #[tokio::test]
  async fn test_recursive_drain_follows_pagination_with_token_only() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([entry("e1", "one")]), Some("p1"), None),
      page(json!([entry("e2", "two")]), Some("p2"), None),
      page(json!([entry("e3", "three")]), None, Some("s1")),
    ]));

    let batch = engine
      .drain(SyncParams::new().locale("en-us"), true)
      .await
      .unwrap();

    let calls = engine.fetcher().calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(Value::Object(calls[1].clone()), json!({"pagination_token": "p1"}));
    assert_eq!(Value::Object(calls[2].clone()), json!({"pagination_token": "p2"}));

    assert_eq!(titles(&batch), vec!["one", "two", "three"]);
    assert_eq!(batch.sync_token.as_deref(), Some("s1"));
    assert_eq!(batch.pagination_token, None);
  }

  #[tokio::test]
  async fn test_later_page_wins_for_same_entity() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([entry("e1", "old"), entry("e2", "kept")]), Some("p1"), None),
      page(json!([entry("e1", "new")]), None, Some("s1")),
    ]));

    let batch = engine.drain(SyncParams::new(), true).await.unwrap();

    assert_eq!(titles(&batch), vec!["new", "kept"]);
  }

  fn localized(uid: &str, locale: &str) -> Value {
    json!({
      "type": "entry_published",
      "content_type_uid": "blog",
      "data": {"uid": uid, "title": locale, "publish_details": {"locale": locale}}
    })
  }

  #[tokio::test]
  async fn test_locales_of_one_entry_are_kept_apart() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([localized("e1", "en-us")]), Some("p1"), None),
      page(json!([localized("e1", "fr-fr")]), None, Some("s1")),
    ]));

    let batch = engine.drain(SyncParams::new(), true).await.unwrap();

    assert_eq!(titles(&batch), vec!["en-us", "fr-fr"]);
  }

  #[tokio::test]
  async fn test_first_page_is_identical_with_and_without_recursion() {
    let first = || page(json!([entry("e1", "a"), entry("e1", "b")]), None, Some("s1"));

    let flat = SyncEngine::new(ScriptedFetcher::new(vec![first()]))
      .drain(SyncParams::new(), false)
      .await
      .unwrap();
    let recursive = SyncEngine::new(ScriptedFetcher::new(vec![first()]))
      .drain(SyncParams::new(), true)
      .await
      .unwrap();

    assert_eq!(titles(&flat), vec!["a", "b"]);
    assert_eq!(titles(&recursive), titles(&flat));
  }

  #[tokio::test]
  async fn test_later_page_replaces_last_duplicate_of_first_page() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([entry("e1", "a"), entry("e1", "b")]), Some("p1"), None),
      page(json!([entry("e1", "c")]), None, Some("s1")),
    ]));

    let batch = engine.drain(SyncParams::new(), true).await.unwrap();

    assert_eq!(titles(&batch), vec!["a", "c"]);
  }

  #[tokio::test]
  async fn test_items_without_identity_are_kept() {
    let anonymous = json!({"type": "content_type_deleted", "data": {"title": "anon"}});
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([anonymous.clone()]), Some("p1"), None),
      page(json!([anonymous]), None, Some("s1")),
    ]));

    let batch = engine.drain(SyncParams::new(), true).await.unwrap();
    assert_eq!(batch.items.len(), 2);
  }

  #[tokio::test]
  async fn test_page_failure_aborts_drain() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![
      page(json!([entry("e1", "one")]), Some("p1"), None),
      Err(ClientError::Network(TransportError::Timeout {
        url: "https://cdn.example.io/v3/stacks/sync".to_string(),
      })),
    ]));

    let result = engine.drain(SyncParams::new(), true).await;

    assert!(matches!(
      result,
      Err(ClientError::Network(TransportError::Timeout { .. }))
    ));
    assert_eq!(engine.fetcher().calls().len(), 2);
  }

  #[tokio::test]
  async fn test_resume_from_pagination_token() {
    let engine = SyncEngine::new(ScriptedFetcher::new(vec![page(
      json!([]),
      None,
      Some("s9"),
    )]));

    engine
      .drain(SyncParams::from_pagination_token("p7"), false)
      .await
      .unwrap();

    let calls = engine.fetcher().calls();
    assert_eq!(Value::Object(calls[0].clone()), json!({"pagination_token": "p7"}));
  }
}
