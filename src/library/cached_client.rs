//! Cached library client: queries go through the tag-aware cache, mutations
//! invalidate it.
//!
//! This wraps [`LibraryClient`] with the same operations, but reads resolve
//! from the process-wide cache when fresh and every successful mutation
//! marks the affected tags stale so dependent views refetch. Invalidation
//! happens strictly after the mutation's success response is observed.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};

use crate::cache::{QueryCache, Subscription};
use crate::config::Config;
use crate::error::ApiError;

use super::client::LibraryClient;
use super::queries::{LibraryQuery, BOOK_MUTATION_TAGS, BORROW_MUTATION_TAGS};
use super::types::{Book, BookFields, BorrowRequest, BorrowSummaryItem, ListEnvelope};

/// Library client with transparent caching and tag invalidation.
#[derive(Clone)]
pub struct CachedLibraryClient {
  inner: LibraryClient,
  cache: QueryCache,
}

impl CachedLibraryClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = config.base_url()?;
    Ok(Self {
      inner: LibraryClient::new(&base_url),
      cache: QueryCache::new(),
    })
  }

  /// The underlying cache, for subscriptions and diagnostics.
  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// List books with pagination, cached per (page, limit).
  pub async fn list_books(&self, page: u32, limit: u32) -> Result<ListEnvelope<Book>> {
    let key = LibraryQuery::Books { page, limit };
    let result = self
      .cache
      .fetch(&key, || {
        let inner = self.inner.clone();
        async move { Ok(inner.list_books(page, limit).await?) }
      })
      .await?;
    Ok(result.data)
  }

  /// Get a single book by id, cached per id.
  ///
  /// With no id there is nothing to ask for: the call is skipped entirely
  /// and no request is issued.
  pub async fn get_book(&self, id: Option<&str>) -> Result<Option<Book>> {
    let id = match id {
      Some(id) if !id.trim().is_empty() => id.trim().to_string(),
      _ => return Ok(None),
    };

    let key = LibraryQuery::BookDetail { id: id.clone() };
    let result = self
      .cache
      .fetch(&key, || {
        let inner = self.inner.clone();
        async move { Ok(inner.get_book(&id).await?) }
      })
      .await?;
    Ok(Some(result.data))
  }

  /// Genre strings the server accepts, cached.
  pub async fn list_genres(&self) -> Result<Vec<String>> {
    let result = self
      .cache
      .fetch(&LibraryQuery::Genres, || {
        let inner = self.inner.clone();
        async move { Ok(inner.list_genres().await?) }
      })
      .await?;
    Ok(result.data)
  }

  /// Total quantity borrowed per book, cached.
  pub async fn borrow_summary(&self) -> Result<Vec<BorrowSummaryItem>> {
    let result = self
      .cache
      .fetch(&LibraryQuery::BorrowSummary, || {
        let inner = self.inner.clone();
        async move { Ok(inner.borrow_summary().await?) }
      })
      .await?;
    Ok(result.data)
  }

  /// Create a book, then invalidate book queries.
  pub async fn create_book(&self, fields: &BookFields) -> Result<Book> {
    let envelope = self.inner.create_book(fields).await?;
    if !envelope.success {
      return Err(eyre!(
        "{}",
        envelope.message.unwrap_or_else(|| "create rejected".to_string())
      ));
    }

    self.cache.invalidate(BOOK_MUTATION_TAGS)?;
    envelope
      .data
      .ok_or_else(|| eyre!("server acknowledged the create without the book"))
  }

  /// Update a book, then invalidate book queries.
  pub async fn update_book(&self, id: &str, fields: &BookFields) -> Result<Book> {
    if id.trim().is_empty() {
      return Err(ApiError::MissingId("book").into());
    }

    let envelope = self.inner.update_book(id.trim(), fields).await?;
    if !envelope.success {
      return Err(eyre!(
        "{}",
        envelope.message.unwrap_or_else(|| "update rejected".to_string())
      ));
    }

    self.cache.invalidate(BOOK_MUTATION_TAGS)?;
    envelope
      .data
      .ok_or_else(|| eyre!("server acknowledged the update without the book"))
  }

  /// Delete a book, then invalidate book queries.
  pub async fn delete_book(&self, id: &str) -> Result<()> {
    if id.trim().is_empty() {
      return Err(ApiError::MissingId("book").into());
    }

    let envelope = self.inner.delete_book(id.trim()).await?;
    if !envelope.success {
      return Err(eyre!(
        "{}",
        envelope.message.unwrap_or_else(|| "delete rejected".to_string())
      ));
    }

    self.cache.invalidate(BOOK_MUTATION_TAGS)?;
    Ok(())
  }

  /// Borrow copies of a book, then invalidate both book and borrow queries.
  ///
  /// A missing book id is a precondition error: no request is sent. Quantity
  /// and due-date limits are enforced server-side (and checked locally by
  /// the form validation before submission).
  pub async fn borrow_book(
    &self,
    book_id: &str,
    due_date: DateTime<Utc>,
    quantity: u32,
  ) -> Result<()> {
    if book_id.trim().is_empty() {
      return Err(ApiError::MissingId("book").into());
    }

    let request = BorrowRequest {
      book: book_id.trim().to_string(),
      quantity,
      due_date,
    };
    let envelope = self.inner.borrow_book(&request).await?;
    if !envelope.success {
      return Err(eyre!(
        "{}",
        envelope.message.unwrap_or_else(|| "borrow rejected".to_string())
      ));
    }

    self.cache.invalidate(BORROW_MUTATION_TAGS)?;
    Ok(())
  }

  /// Subscribe to a query: the entry stays alive while the subscription is
  /// held, and the subscriber is woken on every store or invalidation.
  pub fn subscribe(&self, query: &LibraryQuery) -> Result<Subscription> {
    self.cache.subscribe(query)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::library::types::BorrowedBook;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  fn unreachable_client() -> CachedLibraryClient {
    // Nothing listens here; any issued request would fail as a transport
    // error rather than a precondition error.
    let config = Config {
      base_url: "http://127.0.0.1:9/api".to_string(),
      ..Config::default()
    };
    CachedLibraryClient::new(&config).unwrap()
  }

  /// Serve exactly one canned 200 response, then hang up. Returns a client
  /// pointed at the listener.
  async fn one_shot_client(body: &'static str) -> CachedLibraryClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut chunk = [0u8; 1024];
      loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&chunk[..n]);
        if request_complete(&request) {
          break;
        }
      }
      let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
      );
      stream.write_all(response.as_bytes()).await.unwrap();
    });

    let config = Config {
      base_url: format!("http://{}/api", addr),
      ..Config::default()
    };
    CachedLibraryClient::new(&config).unwrap()
  }

  fn request_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
      return false;
    };
    let head = String::from_utf8_lossy(&buf[..end]);
    let length = head
      .lines()
      .filter_map(|line| line.split_once(':'))
      .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
      .and_then(|(_, value)| value.trim().parse::<usize>().ok())
      .unwrap_or(0);
    buf.len() >= end + 4 + length
  }

  #[tokio::test]
  async fn test_get_book_without_id_skips_the_request() {
    let client = unreachable_client();
    assert_eq!(client.get_book(None).await.unwrap(), None);
    assert_eq!(client.get_book(Some("  ")).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_borrow_without_id_is_a_precondition_error() {
    let client = unreachable_client();
    let due = Utc::now() + chrono::Duration::days(7);

    let err = client.borrow_book("", due, 1).await.unwrap_err();
    let api_err = err.downcast_ref::<ApiError>().unwrap();
    assert!(api_err.is_precondition());
  }

  #[tokio::test]
  async fn test_delete_without_id_is_a_precondition_error() {
    let client = unreachable_client();
    let err = client.delete_book(" ").await.unwrap_err();
    assert!(matches!(
      err.downcast_ref::<ApiError>(),
      Some(ApiError::MissingId("book"))
    ));
  }

  #[tokio::test]
  async fn test_failed_borrow_invalidates_nothing() {
    let client = unreachable_client();
    let due = Utc::now() + chrono::Duration::days(7);

    // Populate an entry without the network.
    client
      .cache()
      .fetch(&LibraryQuery::Genres, || async {
        Ok(vec!["FANTASY".to_string()])
      })
      .await
      .unwrap();

    // The borrow fails in transit; the cached entry must stay fresh.
    assert!(client.borrow_book("abc", due, 1).await.is_err());

    let sub = client.subscribe(&LibraryQuery::Genres).unwrap();
    assert!(!sub.is_stale().unwrap());
  }

  #[tokio::test]
  async fn test_successful_create_marks_book_entries_stale() {
    let client = one_shot_client(
      r#"{"success":true,"data":{
        "_id":"68665a058fa8216cbcc93929",
        "title":"Dune","author":"Frank Herbert","genre":"SCI_FI",
        "isbn":"123","copies":2,"available":true,
        "createdAt":"2025-07-03T10:23:01.408Z",
        "updatedAt":"2025-07-03T10:23:01.408Z"
      }}"#,
    )
    .await;

    // A fresh Books-tagged entry, populated without the network.
    client
      .cache()
      .fetch(&LibraryQuery::Genres, || async {
        Ok(vec!["SCI_FI".to_string()])
      })
      .await
      .unwrap();
    let sub = client.subscribe(&LibraryQuery::Genres).unwrap();
    assert!(!sub.is_stale().unwrap());

    let fields = BookFields {
      title: "Dune".to_string(),
      author: "Frank Herbert".to_string(),
      genre: "SCI_FI".to_string(),
      isbn: "123".to_string(),
      description: None,
      copies: 2,
      available: true,
    };
    let created = client.create_book(&fields).await.unwrap();
    assert_eq!(created.id, "68665a058fa8216cbcc93929");

    // The mutation succeeded, so the Books entry must now be stale.
    assert!(sub.is_stale().unwrap());
  }

  #[tokio::test]
  async fn test_successful_borrow_marks_borrow_entries_stale() {
    let client = one_shot_client(r#"{"success":true,"message":"Book borrowed successfully"}"#).await;

    client
      .cache()
      .fetch(&LibraryQuery::BorrowSummary, || async {
        Ok(vec![BorrowSummaryItem {
          book: BorrowedBook {
            title: "Dune".to_string(),
            isbn: "123".to_string(),
          },
          total_quantity: 2,
        }])
      })
      .await
      .unwrap();
    let summary = client.subscribe(&LibraryQuery::BorrowSummary).unwrap();
    assert!(!summary.is_stale().unwrap());

    let due = Utc::now() + chrono::Duration::days(7);
    client.borrow_book("abc", due, 1).await.unwrap();

    assert!(summary.is_stale().unwrap());
  }
}
