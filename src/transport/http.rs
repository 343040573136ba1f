//! reqwest-backed transport.

use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{NetworkOutcome, Request, ResponseMeta, Transport};
use crate::error::TransportError;

/// Sends requests over HTTPS to the delivery API.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  /// Create a transport rooted at `base_url` (e.g. `https://cdn.contentstack.io/v3`).
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
    let base_url = Url::parse(base_url)
      .map_err(|e| TransportError::InvalidRequest(format!("bad base url {}: {}", base_url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("stack-delivery/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| TransportError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Join the request path onto the base and append its parameters.
  fn url_for(&self, request: &Request) -> Url {
    let mut url = self.base_url.clone();
    let path = format!(
      "{}/{}",
      self.base_url.path().trim_end_matches('/'),
      request.path.trim_start_matches('/')
    );
    url.set_path(&path);

    if !request.params.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in &request.params {
        match value {
          // Repeatable parameters such as `include[]`
          Value::Array(values) => {
            for v in values {
              pairs.append_pair(key, &param_value(v));
            }
          }
          other => {
            pairs.append_pair(key, &param_value(other));
          }
        }
      }
    }

    url
  }
}

impl Transport for HttpTransport {
  fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, NetworkOutcome> {
    Box::pin(async move {
      let url = self.url_for(request);

      let mut builder = self.client.get(url.clone());
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }

      debug!(path = %request.path, retry = request.retry_count, "sending request");

      let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => return NetworkOutcome::Failure(classify(&url, e)),
      };

      let status = response.status();
      let meta = ResponseMeta {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers: response
          .headers()
          .iter()
          .filter_map(|(name, value)| {
            value
              .to_str()
              .ok()
              .map(|v| (name.to_string(), v.to_string()))
          })
          .collect(),
      };

      let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return NetworkOutcome::Failure(classify(&url, e)),
      };

      if !status.is_success() {
        return NetworkOutcome::Failure(TransportError::Status {
          url: redact(&url),
          status: meta.status,
          message: error_message(&body),
        });
      }

      NetworkOutcome::from_body(meta, body)
    })
  }
}

/// Render a parameter the way the API expects it in a query string.
/// Strings go as-is, everything else as compact JSON.
/// Arrays are expanded by the caller.
fn param_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn classify(url: &Url, e: reqwest::Error) -> TransportError {
  let url = redact(url);
  if e.is_timeout() {
    TransportError::Timeout { url }
  } else if e.is_builder() {
    TransportError::InvalidRequest(e.to_string())
  } else {
    TransportError::Connect {
      url,
      message: e.to_string(),
    }
  }
}

/// URL without its query string, for error messages.
fn redact(url: &Url) -> String {
  let mut url = url.clone();
  url.set_query(None);
  url.to_string()
}

/// Pull `error_message` out of an API error body, or fall back to the raw text.
fn error_message(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| {
      v.get("error_message")
        .and_then(Value::as_str)
        .map(String::from)
    })
    .unwrap_or_else(|| body.chars().take(200).collect())
}
