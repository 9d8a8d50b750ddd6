//! Structured errors for the API client core.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure surfaced by the API client core.
///
/// Network failures, non-2xx statuses and malformed bodies all collapse into
/// this one type; the client never retries on its own.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request never produced a usable response (DNS, connect, TLS, ...).
  #[error("request to {url} failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-2xx status.
  #[error("server returned {status} for {url}: {message}")]
  Status {
    status: StatusCode,
    url: String,
    message: String,
  },

  /// The response body did not match the expected shape.
  #[error("failed to decode response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  /// A dependent action was attempted without the identifier it needs.
  /// Short-circuited client-side; no request is sent.
  #[error("no {0} id provided")]
  MissingId(&'static str),
}

impl ApiError {
  /// True when the failure happened before any request left the process.
  pub fn is_precondition(&self) -> bool {
    matches!(self, ApiError::MissingId(_))
  }
}
