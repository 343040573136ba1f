//! Request model and the network seam.
//!
//! Everything above this module talks to the remote service through the
//! [`Transport`] trait, so tests can swap in scripted transports and
//! cross-cutting behaviour (retries) can be layered as decorators.

mod http;
mod outcome;
mod retry;

pub use http::HttpTransport;
pub use outcome::{NetworkOutcome, ResponseMeta};
pub use retry::{RetryConfig, RetryTransport};

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A fully described read request against the delivery API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
  /// Path relative to the API base, e.g. `/content_types/blog/entries/e1`.
  pub path: String,
  /// Query parameters, wire-convention keys.
  pub params: Map<String, Value>,
  pub headers: BTreeMap<String, String>,
  /// Content type the request is scoped to, if any.
  pub content_type_uid: Option<String>,
  /// Explicit entry uid; takes precedence over the one in `path`.
  pub entry_uid: Option<String>,
  /// How many times this request has already been retried.
  pub retry_count: u32,
}

impl Request {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      ..Default::default()
    }
  }

  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn with_content_type(mut self, uid: impl Into<String>) -> Self {
    self.content_type_uid = Some(uid.into());
    self
  }

  pub fn with_entry(mut self, uid: impl Into<String>) -> Self {
    self.entry_uid = Some(uid.into());
    self
  }
}

/// Performs one network call.
pub trait Transport: Send + Sync {
  fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, NetworkOutcome>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
  fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, NetworkOutcome> {
    (**self).send(request)
  }
}
