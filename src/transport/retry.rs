//! Retry decorator with exponential backoff.
//!
//! Wraps any [`Transport`] and repeats requests that failed with a retryable
//! [`TransportError`]. Empty responses and successes pass straight through, so
//! the cache engine still sees the outcome the server actually produced.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{NetworkOutcome, Request, Transport};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub factor: f64,
  /// Retries after the first attempt.
  pub max_retries: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      initial_delay: Duration::from_millis(300),
      max_delay: Duration::from_secs(5),
      factor: 2.0,
      max_retries: 3,
    }
  }
}

impl RetryConfig {
  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  fn next_delay(&self, delay: Duration) -> Duration {
    delay.mul_f64(self.factor).min(self.max_delay)
  }
}

/// A transport that retries transient failures of an inner transport.
pub struct RetryTransport<T> {
  inner: T,
  config: RetryConfig,
}

impl<T: Transport> RetryTransport<T> {
  pub fn new(inner: T, config: RetryConfig) -> Self {
    Self { inner, config }
  }
}

impl<T: Transport> Transport for RetryTransport<T> {
  fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, NetworkOutcome> {
    Box::pin(async move {
      let mut attempt = request.clone();
      let mut delay = self.config.initial_delay;

      loop {
        match self.inner.send(&attempt).await {
          NetworkOutcome::Failure(err)
            if err.is_retryable() && attempt.retry_count < self.config.max_retries =>
          {
            attempt.retry_count += 1;
            warn!(
              path = %attempt.path,
              "request failed (attempt {}/{}): {}. Retrying in {:?}",
              attempt.retry_count,
              self.config.max_retries + 1,
              err,
              delay
            );
            sleep(delay).await;
            delay = self.config.next_delay(delay);
          }
          outcome => {
            if attempt.retry_count > 0 && !outcome.is_failure() {
              info!(path = %attempt.path, "request succeeded after {} retries", attempt.retry_count);
            }
            return outcome;
          }
        }
      }
    })
  }
}
