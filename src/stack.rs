//! The stack client: every read the delivery API offers, behind one handle.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{
  CacheOptions, CachePolicy, CachePolicyEngine, NoopStore, PersistenceStore, Response, SqliteStore,
};
use crate::config::{Config, StackConfig};
use crate::error::{ClientError, ClientResult};
use crate::params::to_snake_case;
use crate::query::{Query, QueryTarget};
use crate::resource::{cache_root, ResourceKey};
use crate::sync::{SyncBatch, SyncEngine, SyncPage, SyncPageFetcher, SyncParams};
use crate::transport::{
  HttpTransport, NetworkOutcome, Request, RetryConfig, RetryTransport, Transport,
};

/// Store type used by [`Stack::from_config`].
pub type SharedStore = Arc<dyn PersistenceStore>;

/// Client for one stack and environment.
///
/// Reads go through the configured [`CachePolicy`]; sync never does.
pub struct Stack<S: PersistenceStore = SharedStore> {
  api_key: String,
  environment: String,
  headers: BTreeMap<String, String>,
  transport: Arc<dyn Transport>,
  cache: CachePolicyEngine<S>,
}

impl Stack<SharedStore> {
  /// Build a client from loaded configuration: HTTP transport with retries,
  /// and a SQLite store unless the policy ignores the cache.
  pub fn from_config(config: &Config) -> Result<Self> {
    let http = HttpTransport::new(&config.stack.base_url(), config.http.timeout())
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let transport: Arc<dyn Transport> = if config.http.retries > 0 {
      Arc::new(RetryTransport::new(
        http,
        RetryConfig::default().with_max_retries(config.http.retries),
      ))
    } else {
      Arc::new(http)
    };

    let store: SharedStore = match config.cache.policy {
      CachePolicy::IgnoreCache => Arc::new(NoopStore),
      _ => {
        let store = match &config.cache.path {
          Some(path) => SqliteStore::open(path),
          None => SqliteStore::open_default(),
        }
        .map_err(|e| eyre!("Failed to open cache: {}", e))?;
        Arc::new(store)
      }
    };

    let options =
      CacheOptions::new(config.cache.policy, store).with_max_age(config.cache.max_age());

    Ok(Self::new(&config.stack, transport, options))
  }
}

impl<S: PersistenceStore> Stack<S> {
  pub fn new(stack: &StackConfig, transport: Arc<dyn Transport>, cache: CacheOptions<S>) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("api_key".to_string(), stack.api_key.clone());
    headers.insert("access_token".to_string(), stack.delivery_token.clone());
    if let Some(branch) = &stack.branch {
      headers.insert("branch".to_string(), branch.clone());
    }

    Self {
      api_key: stack.api_key.clone(),
      environment: stack.environment.clone(),
      headers,
      transport,
      cache: CachePolicyEngine::new(cache),
    }
  }

  pub fn api_key(&self) -> &str {
    &self.api_key
  }

  pub fn policy(&self) -> CachePolicy {
    self.cache.policy()
  }

  /// The persistence store behind the cache policy.
  pub fn store(&self) -> &S {
    self.cache.store()
  }

  pub fn content_type<'a>(&'a self, uid: &str) -> ContentType<'a, S> {
    ContentType {
      stack: self,
      uid: uid.to_string(),
    }
  }

  pub fn asset<'a>(&'a self, uid: &str) -> Asset<'a, S> {
    Asset {
      stack: self,
      uid: uid.to_string(),
    }
  }

  /// Query over all assets.
  pub fn assets(&self) -> Query {
    Query::assets()
  }

  /// Query over entries by taxonomy terms.
  pub fn taxonomies(&self) -> Query {
    Query::taxonomies()
  }

  /// Run a query built with [`Query`].
  pub async fn find(&self, query: Query) -> ClientResult<Response> {
    let kind = match query.target() {
      QueryTarget::Entries { .. } => ResourceKey::Entries,
      QueryTarget::Assets => ResourceKey::Assets,
      QueryTarget::Taxonomies => ResourceKey::Taxonomies,
    };
    self.read(kind, query.into_request()).await
  }

  /// Delta sync. With `recursive`, follows pagination to the end of the pass.
  pub async fn sync(&self, params: SyncParams, recursive: bool) -> ClientResult<SyncBatch> {
    let fetcher = StackSyncFetcher {
      transport: Arc::clone(&self.transport),
      headers: self.headers.clone(),
      environment: self.environment.clone(),
    };
    SyncEngine::new(fetcher).drain(params, recursive).await
  }

  /// Decorate `request` with auth headers and environment, then settle it
  /// through the cache policy.
  async fn read(&self, kind: ResourceKey, mut request: Request) -> ClientResult<Response> {
    for (name, value) in &self.headers {
      request
        .headers
        .entry(name.clone())
        .or_insert_with(|| value.clone());
    }
    request
      .params
      .entry("environment".to_string())
      .or_insert_with(|| Value::String(self.environment.clone()));

    let root = cache_root(
      &self.api_key,
      request
        .params
        .get("environment")
        .and_then(Value::as_str)
        .unwrap_or(&self.environment),
      request.headers.get("branch").map(String::as_str),
    );
    let namespace = kind.namespace(&root, &request.params);

    debug!(
      resource = %kind.description(),
      path = %request.path,
      policy = %self.cache.policy(),
      "reading"
    );

    let transport = &self.transport;
    let request = &request;
    self
      .cache
      .handle(&namespace, request, || transport.send(request))
      .await
  }
}

/// Handle on one content type.
pub struct ContentType<'a, S: PersistenceStore> {
  stack: &'a Stack<S>,
  uid: String,
}

impl<'a, S: PersistenceStore> ContentType<'a, S> {
  /// Fetch the content type schema.
  pub async fn fetch(&self) -> ClientResult<Response> {
    let request = Request::get(format!("/content_types/{}", self.uid)).with_content_type(&self.uid);
    self.stack.read(ResourceKey::ContentType, request).await
  }

  pub fn entry(&self, uid: &str) -> Entry<'a, S> {
    Entry {
      stack: self.stack,
      content_type_uid: self.uid.clone(),
      uid: uid.to_string(),
      params: Map::new(),
    }
  }

  /// Query over this content type's entries.
  pub fn query(&self) -> Query {
    Query::entries(&self.uid)
  }

  /// Every entry of this content type, unfiltered.
  pub async fn entries(&self) -> ClientResult<Response> {
    self.stack.find(self.query()).await
  }
}

/// Handle on one entry.
pub struct Entry<'a, S: PersistenceStore> {
  stack: &'a Stack<S>,
  content_type_uid: String,
  uid: String,
  params: Map<String, Value>,
}

impl<'a, S: PersistenceStore> Entry<'a, S> {
  pub fn locale(self, locale: &str) -> Self {
    self.param("locale", locale)
  }

  /// Resolve a reference field inline. May be called repeatedly.
  pub fn include_reference(mut self, field: &str) -> Self {
    let slot = self
      .params
      .entry("include[]".to_string())
      .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(fields) = slot {
      fields.push(Value::String(field.to_string()));
    }
    self
  }

  /// Any other parameter; `camelCase` keys are sent as `snake_case`.
  pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.params.insert(to_snake_case(key), value.into());
    self
  }

  pub async fn fetch(self) -> ClientResult<Response> {
    let mut request = Request::get(format!(
      "/content_types/{}/entries/{}",
      self.content_type_uid, self.uid
    ))
    .with_content_type(&self.content_type_uid);
    request.params = self.params;
    self.stack.read(ResourceKey::Entries, request).await
  }
}

/// Handle on one asset.
pub struct Asset<'a, S: PersistenceStore> {
  stack: &'a Stack<S>,
  uid: String,
}

impl<'a, S: PersistenceStore> Asset<'a, S> {
  pub async fn fetch(&self) -> ClientResult<Response> {
    let request = Request::get(format!("/assets/{}", self.uid));
    let kind = ResourceKey::Asset {
      uid: self.uid.clone(),
    };
    self.stack.read(kind, request).await
  }
}

/// Fetches sync pages over the stack's transport.
struct StackSyncFetcher {
  transport: Arc<dyn Transport>,
  headers: BTreeMap<String, String>,
  environment: String,
}

impl SyncPageFetcher for StackSyncFetcher {
  fn fetch_page<'a>(
    &'a self,
    params: &'a Map<String, Value>,
  ) -> BoxFuture<'a, ClientResult<SyncPage>> {
    Box::pin(async move {
      let mut request = Request::get("/stacks/sync");
      request.headers = self.headers.clone();
      request.params = params.clone();
      request
        .params
        .entry("environment".to_string())
        .or_insert_with(|| Value::String(self.environment.clone()));

      match self.transport.send(&request).await {
        NetworkOutcome::Success { body, .. } => Ok(serde_json::from_str(&body)?),
        NetworkOutcome::Empty(meta) => Err(ClientError::EmptyPayload(meta)),
        NetworkOutcome::Failure(err) => Err(err.into()),
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStore, ResponseSource};
  use crate::error::TransportError;
  use crate::region::Region;
  use crate::sync::SyncEventType;
  use crate::transport::ResponseMeta;
  use serde_json::json;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Replays scripted outcomes and records every request it is handed.
  #[derive(Default)]
  struct MockTransport {
    outcomes: Mutex<VecDeque<NetworkOutcome>>,
    requests: Mutex<Vec<Request>>,
  }

  impl MockTransport {
    fn with(outcomes: Vec<NetworkOutcome>) -> Arc<Self> {
      Arc::new(Self {
        outcomes: Mutex::new(outcomes.into()),
        requests: Mutex::new(Vec::new()),
      })
    }

    fn requests(&self) -> Vec<Request> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl Transport for MockTransport {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, NetworkOutcome> {
      Box::pin(async move {
        self.requests.lock().unwrap().push(request.clone());
        self
          .outcomes
          .lock()
          .unwrap()
          .pop_front()
          .unwrap_or(NetworkOutcome::Failure(TransportError::Connect {
            url: "mock".to_string(),
            message: "no scripted outcome".to_string(),
          }))
      })
    }
  }

  fn ok(body: Value) -> NetworkOutcome {
    NetworkOutcome::Success {
      meta: ResponseMeta::new(200, "OK"),
      body: body.to_string(),
    }
  }

  fn stack_config() -> StackConfig {
    StackConfig {
      api_key: "blt_api".to_string(),
      environment: "production".to_string(),
      region: Region::Us,
      host: None,
      branch: Some("main".to_string()),
      delivery_token: "cs_token".to_string(),
    }
  }

  fn stack(policy: CachePolicy, transport: Arc<MockTransport>) -> Stack<MemoryStore> {
    Stack::new(
      &stack_config(),
      transport,
      CacheOptions::new(policy, MemoryStore::new()),
    )
  }

  #[tokio::test]
  async fn test_entry_fetch_sends_auth_and_environment() {
    let transport = MockTransport::with(vec![ok(json!({"entry": {"uid": "e1"}}))]);
    let stack = stack(CachePolicy::IgnoreCache, transport.clone());

    let response = stack
      .content_type("blog")
      .entry("e1")
      .locale("en-us")
      .fetch()
      .await
      .unwrap();
    assert_eq!(response.data["entry"]["uid"], json!("e1"));

    let sent = &transport.requests()[0];
    assert_eq!(sent.path, "/content_types/blog/entries/e1");
    assert_eq!(sent.headers["api_key"], "blt_api");
    assert_eq!(sent.headers["access_token"], "cs_token");
    assert_eq!(sent.headers["branch"], "main");
    assert_eq!(sent.params["environment"], json!("production"));
    assert_eq!(sent.params["locale"], json!("en-us"));
    assert!(stack.store().is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_entry_fetch_is_served_from_cache_second_time() {
    let transport = MockTransport::with(vec![ok(json!({"entry": {"uid": "e1"}}))]);
    let stack = stack(CachePolicy::CacheThenNetwork, transport.clone());

    let first = stack.content_type("blog").entry("e1").fetch().await.unwrap();
    let second = stack.content_type("blog").entry("e1").fetch().await.unwrap();

    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.data, first.data);
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(
      stack.store().get("blog_blt_api_production_main_entry_e1", "blog").unwrap(),
      Some(json!({"entry": {"uid": "e1"}}))
    );
  }

  #[tokio::test]
  async fn test_environments_and_branches_sharing_a_store_stay_apart() {
    let store = Arc::new(MemoryStore::new());
    let production_net = MockTransport::with(vec![ok(json!({"entry": "PROD"}))]);
    let staging_net = MockTransport::with(vec![ok(json!({"entry": "STAGING"}))]);
    let branch_net = MockTransport::with(vec![ok(json!({"entry": "BRANCH"}))]);

    let stack_for = |environment: &str, branch: Option<&str>, transport: Arc<MockTransport>| {
      let mut config = stack_config();
      config.environment = environment.to_string();
      config.branch = branch.map(String::from);
      Stack::new(
        &config,
        transport,
        CacheOptions::new(CachePolicy::CacheThenNetwork, Arc::clone(&store)),
      )
    };
    let production = stack_for("production", None, production_net.clone());
    let staging = stack_for("staging", None, staging_net.clone());
    let branched = stack_for("production", Some("feature"), branch_net.clone());

    let prod = production.content_type("blog").entry("e1").fetch().await.unwrap();
    let stage = staging.content_type("blog").entry("e1").fetch().await.unwrap();
    let branch = branched.content_type("blog").entry("e1").fetch().await.unwrap();

    assert_eq!(prod.data, json!({"entry": "PROD"}));
    assert_eq!(stage.data, json!({"entry": "STAGING"}));
    assert_eq!(stage.source, ResponseSource::Network);
    assert_eq!(branch.data, json!({"entry": "BRANCH"}));
    assert_eq!(branch.source, ResponseSource::Network);
    assert_eq!(store.len().unwrap(), 3);

    let again = production.content_type("blog").entry("e1").fetch().await.unwrap();
    assert_eq!(again.data, json!({"entry": "PROD"}));
    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(production_net.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_different_queries_do_not_share_cache() {
    let transport = MockTransport::with(vec![
      ok(json!({"entries": [1]})),
      ok(json!({"entries": [2]})),
    ]);
    let stack = stack(CachePolicy::CacheElseNetwork, transport.clone());

    let a = stack
      .find(stack.content_type("blog").query().limit(1))
      .await
      .unwrap();
    let b = stack
      .find(stack.content_type("blog").query().equal_to("title", "x"))
      .await
      .unwrap();

    assert_eq!(a.data, json!({"entries": [1]}));
    assert_eq!(b.data, json!({"entries": [2]}));
    assert_eq!(transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_network_else_cache_serves_cache_on_empty() {
    let transport = MockTransport::with(vec![
      ok(json!({"asset": {"uid": "a1"}})),
      NetworkOutcome::Empty(ResponseMeta::new(204, "No Content")),
    ]);
    let stack = stack(CachePolicy::NetworkElseCache, transport.clone());

    stack.asset("a1").fetch().await.unwrap();
    let fallback = stack.asset("a1").fetch().await.unwrap();

    assert_eq!(fallback.source, ResponseSource::Cache);
    assert_eq!(fallback.status_text, "OK");
    assert_eq!(fallback.data, json!({"asset": {"uid": "a1"}}));
    assert_eq!(transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_content_type_schema_and_entries_use_distinct_keys() {
    let transport = MockTransport::with(vec![
      ok(json!({"content_type": {"uid": "blog"}})),
      ok(json!({"entries": []})),
    ]);
    let stack = stack(CachePolicy::CacheThenNetwork, transport.clone());

    let schema = stack.content_type("blog").fetch().await.unwrap();
    let entries = stack.content_type("blog").entries().await.unwrap();

    assert_eq!(schema.data, json!({"content_type": {"uid": "blog"}}));
    assert_eq!(entries.data, json!({"entries": []}));
    assert_eq!(transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_sync_drains_over_transport() {
    let transport = MockTransport::with(vec![
      ok(json!({
        "items": [{"type": "entry_published", "content_type_uid": "blog", "data": {"uid": "e1"}}],
        "pagination_token": "p1"
      })),
      ok(json!({
        "items": [{"type": "asset_deleted", "content_type_uid": "sys_assets", "data": {"uid": "a1"}}],
        "sync_token": "s1"
      })),
    ]);
    let stack = stack(CachePolicy::CacheThenNetwork, transport.clone());

    let batch = stack
      .sync(
        SyncParams::new().event_type(SyncEventType::EntryPublished),
        true,
      )
      .await
      .unwrap();

    assert_eq!(batch.items.len(), 2);
    assert_eq!(batch.sync_token.as_deref(), Some("s1"));

    let sent = transport.requests();
    assert_eq!(sent[0].path, "/stacks/sync");
    assert_eq!(sent[0].params["init"], json!(true));
    assert_eq!(sent[0].params["type"], json!("entry_published"));
    assert_eq!(sent[1].params["pagination_token"], json!("p1"));
    assert_eq!(sent[1].params["environment"], json!("production"));
    assert!(!sent[1].params.contains_key("type"));
    assert!(stack.store().is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_network_failure_propagates() {
    let transport = MockTransport::with(vec![NetworkOutcome::Failure(TransportError::Status {
      url: "https://cdn.contentstack.io/v3/assets/a1".to_string(),
      status: 404,
      message: "Asset was not found.".to_string(),
    })]);
    let stack = stack(CachePolicy::CacheThenNetwork, transport);

    let err = stack.asset("a1").fetch().await.unwrap_err();
    match err {
      ClientError::Network(e) => assert_eq!(e.status(), Some(404)),
      other => panic!("expected network error, got {:?}", other),
    }
  }
}
