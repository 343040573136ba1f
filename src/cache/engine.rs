//! Cache-policy engine: decides, per request, between the store and the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::key::CacheKey;
use super::response::Response;
use super::storage::{PersistenceStore, GLOBAL_SCOPE};
use crate::error::{ClientError, ClientResult};
use crate::transport::{NetworkOutcome, Request, ResponseMeta};

/// Default time-to-live for cache writes.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Relative precedence of cache and network for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
  /// Always go to the network; the store is never touched.
  #[default]
  IgnoreCache,
  /// Network first; fall back to the store only when the network answers empty.
  NetworkElseCache,
  /// Store first; on a miss, network with write-through.
  CacheThenNetwork,
  /// Same flow as `CacheThenNetwork`.
  CacheElseNetwork,
}

impl CachePolicy {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::IgnoreCache => "ignore_cache",
      Self::NetworkElseCache => "network_else_cache",
      Self::CacheThenNetwork => "cache_then_network",
      Self::CacheElseNetwork => "cache_else_network",
    }
  }
}

impl fmt::Display for CachePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CachePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
      "ignore_cache" => Ok(Self::IgnoreCache),
      "network_else_cache" => Ok(Self::NetworkElseCache),
      "cache_then_network" => Ok(Self::CacheThenNetwork),
      "cache_else_network" => Ok(Self::CacheElseNetwork),
      other => Err(format!("unknown cache policy '{}'", other)),
    }
  }
}

/// Policy, TTL and store a client is configured with.
pub struct CacheOptions<S> {
  pub policy: CachePolicy,
  pub max_age: Duration,
  pub store: S,
}

impl<S: PersistenceStore> CacheOptions<S> {
  pub fn new(policy: CachePolicy, store: S) -> Self {
    Self {
      policy,
      max_age: DEFAULT_MAX_AGE,
      store,
    }
  }

  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }
}

/// Runs one cache-policy decision per request.
///
/// Each call to [`handle`](Self::handle) settles exactly once, as its returned
/// `Result`. Calls on the same key are not serialized: two concurrent misses
/// both fetch and both write, and the last write wins.
pub struct CachePolicyEngine<S: PersistenceStore> {
  store: Arc<S>,
  policy: CachePolicy,
  max_age: Duration,
}

impl<S: PersistenceStore> CachePolicyEngine<S> {
  pub fn new(options: CacheOptions<S>) -> Self {
    Self {
      store: Arc::new(options.store),
      policy: options.policy,
      max_age: options.max_age,
    }
  }

  pub fn policy(&self) -> CachePolicy {
    self.policy
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Settle `request` according to the configured policy.
  ///
  /// `network` performs the actual call and is invoked at most once.
  /// `namespace` roots the cache key (normally the stack api key).
  pub async fn handle<F, Fut>(
    &self,
    namespace: &str,
    request: &Request,
    network: F,
  ) -> ClientResult<Response>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = NetworkOutcome>,
  {
    match self.policy {
      CachePolicy::IgnoreCache => match network().await {
        NetworkOutcome::Success { meta, body } => decode(meta, &body),
        NetworkOutcome::Empty(meta) => Err(ClientError::EmptyPayload(meta)),
        NetworkOutcome::Failure(err) => Err(err.into()),
      },
      CachePolicy::NetworkElseCache => {
        let (key, scope) = locate(namespace, request);
        match network().await {
          NetworkOutcome::Success { meta, body } => self.write_through(&key, scope, meta, &body),
          NetworkOutcome::Empty(meta) => {
            debug!(%key, "network answered empty, falling back to cache");
            match self.store.get(key.as_str(), scope)? {
              Some(value) => Ok(Response::from_cache(value)),
              None => Err(ClientError::EmptyPayload(meta)),
            }
          }
          NetworkOutcome::Failure(err) => Err(err.into()),
        }
      }
      CachePolicy::CacheThenNetwork | CachePolicy::CacheElseNetwork => {
        let (key, scope) = locate(namespace, request);
        if let Some(value) = self.store.get(key.as_str(), scope)? {
          debug!(%key, "cache hit");
          return Ok(Response::from_cache(value));
        }

        debug!(%key, "cache miss, fetching");
        match network().await {
          NetworkOutcome::Success { meta, body } => self.write_through(&key, scope, meta, &body),
          NetworkOutcome::Empty(meta) => Err(ClientError::EmptyPayload(meta)),
          NetworkOutcome::Failure(err) => Err(err.into()),
        }
      }
    }
  }

  /// Decode a network payload, store it under `key`, and settle with it.
  fn write_through(
    &self,
    key: &CacheKey,
    scope: &str,
    meta: ResponseMeta,
    body: &str,
  ) -> ClientResult<Response> {
    let response = decode(meta, body)?;
    self
      .store
      .set(key.as_str(), &response.data, scope, self.max_age)?;
    Ok(response)
  }
}

impl<S: PersistenceStore> Clone for CachePolicyEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      policy: self.policy,
      max_age: self.max_age,
    }
  }
}

/// Cache key and store scope for a request. Transport-only fields play no part.
fn locate<'r>(namespace: &str, request: &'r Request) -> (CacheKey, &'r str) {
  let key = CacheKey::resolve(
    namespace,
    request.content_type_uid.as_deref(),
    request.entry_uid.as_deref(),
    Some(&request.path),
  );
  let scope = request
    .content_type_uid
    .as_deref()
    .unwrap_or(GLOBAL_SCOPE);
  (key, scope)
}

fn decode(meta: ResponseMeta, body: &str) -> ClientResult<Response> {
  let data = serde_json::from_str(body)?;
  Ok(Response::from_network(meta, data))
}
