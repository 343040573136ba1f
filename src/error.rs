//! Error types surfaced by the delivery client.

use thiserror::Error;

use crate::transport::ResponseMeta;

/// Result alias used throughout the library.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure of a single network call.
///
/// Produced by a [`Transport`](crate::transport::Transport) and passed through
/// the cache and sync engines untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  /// The server answered with a non-success status.
  #[error("request to {url} failed with status {status}: {message}")]
  Status {
    url: String,
    status: u16,
    message: String,
  },

  /// The server could not be reached.
  #[error("could not reach {url}: {message}")]
  Connect { url: String, message: String },

  /// The request did not complete in time.
  #[error("request to {url} timed out")]
  Timeout { url: String },

  /// The request could not be built (bad URL, bad header value).
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl TransportError {
  /// Whether repeating the same request may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
      Self::Connect { .. } | Self::Timeout { .. } => true,
      Self::InvalidRequest(_) => false,
    }
  }

  /// HTTP status, when the server produced one.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

/// Failure of the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("cache backend error: {0}")]
  Backend(String),

  #[error("failed to (de)serialize cached value: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("cache lock poisoned")]
  Poisoned,
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Backend(e.to_string())
  }
}

/// Errors returned by [`Stack`](crate::Stack) operations.
#[derive(Debug, Error)]
pub enum ClientError {
  /// The transport failed. Never replaced by a cache read.
  #[error(transparent)]
  Network(#[from] TransportError),

  /// The network answered without a payload and the cache had nothing either.
  /// Carries the original empty response.
  #[error("empty response (status {}) and no cached value", .0.status)]
  EmptyPayload(ResponseMeta),

  /// A payload arrived but could not be decoded.
  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl From<serde_json::Error> for ClientError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}
