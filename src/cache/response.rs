//! The value a cache-policy decision settles with.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::transport::ResponseMeta;

/// Decoded response handed back to the caller, with metadata about its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
  /// Decoded payload
  pub data: Value,
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  /// Request configuration echo; always `{}` for cache hits
  pub config: Value,
  /// Where the payload came from
  #[serde(skip)]
  pub source: ResponseSource,
}

impl Response {
  /// Fresh payload from the network.
  pub fn from_network(meta: ResponseMeta, data: Value) -> Self {
    Self {
      data,
      status: meta.status,
      status_text: meta.status_text,
      headers: meta.headers,
      config: json!({}),
      source: ResponseSource::Network,
    }
  }

  /// Payload read from the store, wrapped in a synthesized `200 OK` envelope.
  pub fn from_cache(data: Value) -> Self {
    Self {
      data,
      status: 200,
      status_text: "OK".to_string(),
      headers: BTreeMap::new(),
      config: json!({}),
      source: ResponseSource::Cache,
    }
  }

  pub fn into_data(self) -> Value {
    self.data
  }
}

/// Indicates where a response payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSource {
  /// Fresh data from the network
  #[default]
  Network,
  /// Data served from the persistence store
  Cache,
}
