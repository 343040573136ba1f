//! The three ways a network call can end.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::TransportError;

/// Status line and headers of an HTTP response, without its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseMeta {
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
  pub fn new(status: u16, status_text: impl Into<String>) -> Self {
    Self {
      status,
      status_text: status_text.into(),
      headers: BTreeMap::new(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }
}

/// Result of handing one request to a transport.
///
/// An `Empty` answer lets a read-capable cache policy fall back to the store.
/// A `Failure` never does.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkOutcome {
  /// The server answered with a payload (raw JSON text).
  Success { meta: ResponseMeta, body: String },
  /// The server answered, but without a usable payload.
  Empty(ResponseMeta),
  /// The call failed.
  Failure(TransportError),
}

impl NetworkOutcome {
  /// Classify a successful response by whether its body carries anything.
  pub fn from_body(meta: ResponseMeta, body: String) -> Self {
    if body.trim().is_empty() {
      Self::Empty(meta)
    } else {
      Self::Success { meta, body }
    }
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, Self::Failure(_))
  }
}
