//! Cache layer that orchestrates lookups, shared in-flight requests and
//! tag-based invalidation.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

use super::store::{Lookup, MemoryStore};
use super::traits::{FetchResult, QueryKey, Tag};

/// Handle to the process-wide query cache.
///
/// Sits between callers and the API client: resolves queries from the cache
/// when the entry is fresh, de-duplicates concurrent identical queries into
/// one network call, and marks entries stale when a mutation invalidates
/// their tags. Clones share the same store.
#[derive(Clone, Default)]
pub struct QueryCache {
  store: Arc<MemoryStore>,
}

/// Clears the in-flight marker if the owning fetch is dropped mid-request,
/// so parked waiters are not stranded.
struct FetchGuard<'a> {
  store: &'a MemoryStore,
  key: &'a str,
  done: bool,
}

impl Drop for FetchGuard<'_> {
  fn drop(&mut self) {
    if !self.done {
      let _ = self.store.fail(self.key, "query was cancelled".to_string());
    }
  }
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolve a query: serve the cached value if the entry is fresh,
  /// otherwise fetch and store.
  ///
  /// Identical queries issued while one is in flight park on the shared
  /// request instead of issuing their own; they all observe the one
  /// resulting entry (or the one failure).
  pub async fn fetch<T, K, F, Fut>(&self, key: &K, fetcher: F) -> Result<FetchResult<T>>
  where
    T: Serialize + DeserializeOwned,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let hash = key.cache_key();
    let mut fetcher = Some(fetcher);
    let mut waited = false;

    loop {
      match self.store.lookup(&hash, key.tags(), waited)? {
        Lookup::Fresh { data, fetched_at } => {
          let data: T = serde_json::from_value(data)
            .map_err(|e| eyre!("cached value for {} is corrupt: {}", key.description(), e))?;
          return Ok(FetchResult::from_cache(data, fetched_at, false));
        }

        Lookup::InFlight(mut rx) => {
          tracing::debug!(query = %key.description(), "waiting on in-flight request");
          waited = rx.changed().await.is_ok();
          // A closed channel means the entry was evicted mid-flight;
          // fall through and claim the fetch ourselves.
        }

        Lookup::Failed(message) => {
          return Err(eyre!("{}", message));
        }

        Lookup::MustFetch => {
          let fetcher = fetcher
            .take()
            .ok_or_else(|| eyre!("fetch for {} restarted after running", key.description()))?;
          let mut guard = FetchGuard {
            store: self.store.as_ref(),
            key: hash.as_str(),
            done: false,
          };

          tracing::debug!(query = %key.description(), "fetching from network");
          match fetcher().await {
            Ok(data) => {
              guard.done = true;
              match serde_json::to_value(&data) {
                Ok(value) => {
                  self.store.complete(&hash, value)?;
                  return Ok(FetchResult::from_network(data));
                }
                Err(e) => {
                  let message = format!(
                    "failed to serialize result for {}: {}",
                    key.description(),
                    e
                  );
                  self.store.fail(&hash, message.clone())?;
                  return Err(eyre!(message));
                }
              }
            }
            Err(err) => {
              guard.done = true;
              self.store.fail(&hash, err.to_string())?;
              return Err(err);
            }
          }
        }
      }
    }
  }

  /// Declare interest in a query.
  ///
  /// The returned [`Subscription`] holds a reference count on the entry and
  /// is notified on every change (fresh data stored, entry invalidated).
  /// Resolution still happens through [`QueryCache::fetch`]; a subscriber
  /// woken by an invalidation refetches by calling it again.
  pub fn subscribe<K: QueryKey>(&self, key: &K) -> Result<Subscription> {
    let hash = key.cache_key();
    let rx = self.store.subscribe(&hash, key.tags())?;
    Ok(Subscription {
      key: hash,
      store: Arc::clone(&self.store),
      rx,
    })
  }

  /// Mark every entry sharing one of `tags` stale. Returns how many entries
  /// were marked. Called by mutations, strictly after their success response.
  pub fn invalidate(&self, tags: &[Tag]) -> Result<usize> {
    let marked = self.store.invalidate(tags)?;
    tracing::debug!(?tags, marked, "invalidated cache entries");
    Ok(marked)
  }

  /// Drop entries nobody subscribes to. Never called automatically; the
  /// store is unbounded by default.
  pub fn evict_unreferenced(&self) -> Result<usize> {
    self.store.evict_unreferenced()
  }

  /// Number of entries currently cached.
  pub fn len(&self) -> Result<usize> {
    self.store.len()
  }

  pub fn is_empty(&self) -> Result<bool> {
    self.store.is_empty()
  }
}

/// A live interest in one query.
///
/// Holds one reference count on the cache entry; dropping the subscription
/// releases it. An entry with no subscribers is eligible for
/// [`QueryCache::evict_unreferenced`].
pub struct Subscription {
  key: String,
  store: Arc<MemoryStore>,
  rx: tokio::sync::watch::Receiver<u64>,
}

impl Subscription {
  /// Wait for the next change to the entry: fresh data stored or the entry
  /// invalidated. Errors if the entry was evicted.
  pub async fn changed(&mut self) -> Result<()> {
    self
      .rx
      .changed()
      .await
      .map_err(|_| eyre!("cache entry was evicted"))
  }

  /// The entry's current value, if it has one.
  pub fn current<T: DeserializeOwned>(&self) -> Result<Option<FetchResult<T>>> {
    match self.store.snapshot(&self.key)? {
      Some(snapshot) => {
        let data: T = serde_json::from_value(snapshot.data)
          .map_err(|e| eyre!("cached value is corrupt: {}", e))?;
        Ok(Some(FetchResult::from_cache(
          data,
          snapshot.fetched_at,
          snapshot.stale,
        )))
      }
      None => Ok(None),
    }
  }

  /// True when the entry has been invalidated and not yet refetched.
  pub fn is_stale(&self) -> Result<bool> {
    Ok(
      self
        .store
        .snapshot(&self.key)?
        .map(|s| s.stale)
        .unwrap_or(false),
    )
  }

  /// Subscriber count on the entry, for diagnostics.
  pub fn subscriber_count(&self) -> Result<usize> {
    Ok(self.store.subscriber_count(&self.key)?.unwrap_or(0))
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.store.unsubscribe(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FetchSource;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  struct TestQuery {
    name: &'static str,
    tags: &'static [Tag],
  }

  impl QueryKey for TestQuery {
    fn cache_key(&self) -> String {
      self.name.to_string()
    }

    fn description(&self) -> String {
      self.name.to_string()
    }

    fn tags(&self) -> &'static [Tag] {
      self.tags
    }
  }

  fn books_query(name: &'static str) -> TestQuery {
    TestQuery {
      name,
      tags: &[Tag::Books],
    }
  }

  #[tokio::test]
  async fn test_second_fetch_hits_cache() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = books_query("books:1:10");

    for expect_cached in [false, true] {
      let calls = calls.clone();
      let result = cache
        .fetch(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(vec![1, 2, 3])
        })
        .await
        .unwrap();
      assert_eq!(result.data, vec![1, 2, 3]);
      assert_eq!(result.is_cached(), expect_cached);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_forces_refetch_on_next_access() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = books_query("books:all");

    let first = {
      let calls = calls.clone();
      cache
        .fetch(&key, move || async move {
          Ok(calls.fetch_add(1, Ordering::SeqCst))
        })
        .await
        .unwrap()
    };
    assert_eq!(first.data, 0);

    cache.invalidate(&[Tag::Books]).unwrap();

    let result = {
      let calls = calls.clone();
      cache
        .fetch(&key, move || async move {
          Ok(calls.fetch_add(1, Ordering::SeqCst))
        })
        .await
        .unwrap()
    };
    assert_eq!(result.source, FetchSource::Network);
    assert_eq!(result.data, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidating_other_tag_keeps_entry_fresh() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = books_query("books:fresh");

    for _ in 0..2 {
      let calls = calls.clone();
      cache
        .fetch(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok("dune".to_string())
        })
        .await
        .unwrap();
      cache.invalidate(&[Tag::BorrowBooks]).unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_identical_queries_share_one_request() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
      let cache = cache.clone();
      let calls = calls.clone();
      handles.push(tokio::spawn(async move {
        let key = books_query("books:shared");
        cache
          .fetch(&key, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec!["dune".to_string()])
          })
          .await
      }));
    }

    for handle in futures::future::join_all(handles).await {
      let result = handle.unwrap().unwrap();
      assert_eq!(result.data, vec!["dune".to_string()]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_waiters_inherit_shared_failure() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..3 {
      let cache = cache.clone();
      let calls = calls.clone();
      handles.push(tokio::spawn(async move {
        let key = books_query("books:broken");
        cache
          .fetch::<Vec<String>, _, _, _>(&key, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(eyre!("connection refused"))
          })
          .await
      }));
    }

    for handle in futures::future::join_all(handles).await {
      let err = handle.unwrap().unwrap_err();
      assert!(err.to_string().contains("connection refused"));
    }
    // One shared request, one shared failure
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fresh_call_after_failure_retries() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = books_query("books:flaky");

    let first = {
      let calls = calls.clone();
      cache
        .fetch::<u32, _, _, _>(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Err(eyre!("boom"))
        })
        .await
    };
    assert!(first.is_err());

    // A new user action is a fresh call, not a parked waiter: it retries.
    let second = {
      let calls = calls.clone();
      cache
        .fetch(&key, move || async move {
          Ok(calls.fetch_add(1, Ordering::SeqCst))
        })
        .await
        .unwrap()
    };
    assert_eq!(second.source, FetchSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_subscription_notified_on_invalidation() {
    let cache = QueryCache::new();
    let key = books_query("books:watched");

    let mut sub = cache.subscribe(&key).unwrap();
    cache
      .fetch(&key, || async { Ok(vec![1, 2]) })
      .await
      .unwrap();
    cache.invalidate(&[Tag::Books]).unwrap();

    sub.changed().await.unwrap();
    assert!(sub.is_stale().unwrap());

    let current = sub.current::<Vec<i32>>().unwrap().unwrap();
    assert_eq!(current.source, FetchSource::CacheStale);
    assert_eq!(current.data, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_dropping_subscription_releases_entry() {
    let cache = QueryCache::new();
    let key = books_query("books:transient");

    let sub = cache.subscribe(&key).unwrap();
    cache.fetch(&key, || async { Ok(7u32) }).await.unwrap();
    assert_eq!(sub.subscriber_count().unwrap(), 1);

    // Referenced entries survive a sweep
    assert_eq!(cache.evict_unreferenced().unwrap(), 0);
    drop(sub);

    assert_eq!(cache.evict_unreferenced().unwrap(), 1);
    assert!(cache.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_unreferenced_entries_survive_until_swept() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let key = books_query("books:oneshot");

    for _ in 0..3 {
      let calls = calls.clone();
      cache
        .fetch(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok("cached".to_string())
        })
        .await
        .unwrap();
    }

    // One-shot fetches reuse the entry until a sweep drops it
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.evict_unreferenced().unwrap(), 1);
  }
}
