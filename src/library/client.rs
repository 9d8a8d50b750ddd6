//! HTTP client for the library management API.
//!
//! One method per operation, all against a single configured base origin.
//! Responses come back as typed envelopes; network failures, non-2xx
//! statuses and malformed bodies surface as [`ApiError`]. No retries.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::library::types::{
  AckEnvelope, Book, BookFields, BorrowRequest, BorrowSummaryItem, ItemEnvelope, ListEnvelope,
  MutationEnvelope,
};

/// Error body the server sends with non-2xx responses.
#[derive(serde::Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: Option<String>,
}

/// Library API client.
#[derive(Clone)]
pub struct LibraryClient {
  http: reqwest::Client,
  /// Base origin without a trailing slash, e.g. "https://host/api"
  base: String,
}

impl LibraryClient {
  pub fn new(base_url: &url::Url) -> Self {
    Self {
      http: reqwest::Client::new(),
      base: base_url.as_str().trim_end_matches('/').to_string(),
    }
  }

  /// List books with pagination.
  pub async fn list_books(&self, page: u32, limit: u32) -> Result<ListEnvelope<Book>, ApiError> {
    let url = format!("{}/books?page={}&limit={}", self.base, page, limit);
    self.get_json(url).await
  }

  /// Get a single book by id.
  pub async fn get_book(&self, id: &str) -> Result<Book, ApiError> {
    let url = format!("{}/books/{}", self.base, id);
    let envelope: ItemEnvelope<Book> = self.get_json(url).await?;
    Ok(envelope.data)
  }

  /// Create a book.
  pub async fn create_book(&self, fields: &BookFields) -> Result<MutationEnvelope<Book>, ApiError> {
    let url = format!("{}/books", self.base);
    self.send_json(self.http.post(&url), url, fields).await
  }

  /// Update a book.
  pub async fn update_book(
    &self,
    id: &str,
    fields: &BookFields,
  ) -> Result<MutationEnvelope<Book>, ApiError> {
    let url = format!("{}/books/{}", self.base, id);
    self.send_json(self.http.put(&url), url, fields).await
  }

  /// Delete a book.
  pub async fn delete_book(&self, id: &str) -> Result<AckEnvelope, ApiError> {
    let url = format!("{}/books/{}", self.base, id);
    tracing::debug!(%url, "DELETE");
    let response = self
      .http
      .delete(&url)
      .send()
      .await
      .map_err(|e| ApiError::Transport {
        url: url.clone(),
        source: e,
      })?;
    Self::decode(url, response).await
  }

  /// List the genre strings the server accepts.
  pub async fn list_genres(&self) -> Result<Vec<String>, ApiError> {
    let url = format!("{}/books/genres", self.base);
    let envelope: ItemEnvelope<Vec<String>> = self.get_json(url).await?;
    Ok(envelope.data)
  }

  /// Borrow copies of a book. The server rejects the request when the
  /// quantity exceeds the available copies or the due date is not strictly
  /// in the future.
  pub async fn borrow_book(&self, request: &BorrowRequest) -> Result<AckEnvelope, ApiError> {
    let url = format!("{}/borrow-books", self.base);
    self.send_json(self.http.post(&url), url, request).await
  }

  /// Total quantity borrowed per book, aggregated server-side.
  pub async fn borrow_summary(&self) -> Result<Vec<BorrowSummaryItem>, ApiError> {
    let url = format!("{}/borrow-books/summary", self.base);
    let envelope: ItemEnvelope<Vec<BorrowSummaryItem>> = self.get_json(url).await?;
    Ok(envelope.data)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
    tracing::debug!(%url, "GET");
    let response = self
      .http
      .get(&url)
      .send()
      .await
      .map_err(|e| ApiError::Transport {
        url: url.clone(),
        source: e,
      })?;
    Self::decode(url, response).await
  }

  async fn send_json<T: DeserializeOwned, B: Serialize>(
    &self,
    request: reqwest::RequestBuilder,
    url: String,
    body: &B,
  ) -> Result<T, ApiError> {
    let payload = serde_json::to_vec(body).map_err(|e| ApiError::Decode {
      url: url.clone(),
      source: e,
    })?;

    tracing::debug!(%url, bytes = payload.len(), "sending");
    let response = request
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .body(payload)
      .send()
      .await
      .map_err(|e| ApiError::Transport {
        url: url.clone(),
        source: e,
      })?;
    Self::decode(url, response).await
  }

  /// Read the body once, then branch on the status: non-2xx carries the
  /// server message when the body has one, 2xx must parse as `T`.
  async fn decode<T: DeserializeOwned>(url: String, response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|e| ApiError::Transport {
      url: url.clone(),
      source: e,
    })?;

    if !status.is_success() {
      let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
          status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
        });
      return Err(ApiError::Status {
        status,
        url,
        message,
      });
    }

    serde_json::from_slice(&body).map_err(|e| ApiError::Decode { url, source: e })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> LibraryClient {
    LibraryClient::new(&url::Url::parse(base).unwrap())
  }

  #[test]
  fn test_base_origin_loses_trailing_slash() {
    let client = client("https://example.com/api/");
    assert_eq!(client.base, "https://example.com/api");
  }

  #[tokio::test]
  async fn test_network_failure_is_a_transport_error() {
    // Nothing listens on this port; the request fails before any response.
    let client = client("http://127.0.0.1:9/api");
    let err = client.list_genres().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert!(!err.is_precondition());
  }
}
