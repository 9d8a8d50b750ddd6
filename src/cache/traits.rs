//! Core traits and types for the query cache.

use chrono::{DateTime, Utc};

/// Resource categories a mutation may invalidate.
///
/// Every cached query carries the tags it depends on; a successful mutation
/// names the tags it touched and every matching entry goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
  /// Book lists, book details, the genre list.
  Books,
  /// Borrow summaries.
  BorrowBooks,
}

impl std::fmt::Display for Tag {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Tag::Books => write!(f, "Books"),
      Tag::BorrowBooks => write!(f, "BorrowBooks"),
    }
  }
}

/// A query identity: operation plus serialized arguments.
///
/// Two keys with the same `cache_key` share one cache entry and, while a
/// request is in flight, one network call.
pub trait QueryKey {
  /// Stable cache key derived from the operation name and its arguments.
  fn cache_key(&self) -> String;

  /// Human-readable description for logs and error messages.
  fn description(&self) -> String;

  /// Tags this query depends on. Invalidating any of them marks the entry
  /// stale.
  fn tags(&self) -> &'static [Tag];
}

/// Result of resolving a query, with metadata about where the data came from.
#[derive(Debug, Clone)]
pub struct FetchResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: FetchSource,
  /// When the data was last stored (None for data straight off the network)
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> FetchResult<T> {
  /// Fresh data straight from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: FetchSource::Network,
      fetched_at: None,
    }
  }

  /// Data served from the cache.
  pub fn from_cache(data: T, fetched_at: DateTime<Utc>, stale: bool) -> Self {
    Self {
      data,
      source: if stale {
        FetchSource::CacheStale
      } else {
        FetchSource::CacheFresh
      },
      fetched_at: Some(fetched_at),
    }
  }

  /// True when the data was served from the cache without a network call.
  pub fn is_cached(&self) -> bool {
    self.source != FetchSource::Network
  }
}

/// Indicates where resolved data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
  /// Fresh data from the network
  Network,
  /// Data from cache, not invalidated since it was stored
  CacheFresh,
  /// Data from cache, invalidated and awaiting refetch
  CacheStale,
}
