//! Process-wide in-memory store backing the query cache.
//!
//! Entries are keyed by (operation, serialized arguments) and hold the
//! last-known JSON value, the tags the query depends on, a staleness flag,
//! a subscriber count and an in-flight marker. The store is only ever
//! mutated through these methods; invalidation is the sole consistency
//! mechanism.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use super::traits::Tag;

/// A single cache entry.
struct Entry {
  data: Option<Value>,
  tags: Vec<Tag>,
  stale: bool,
  fetched_at: Option<DateTime<Utc>>,
  in_flight: bool,
  last_error: Option<String>,
  subscribers: usize,
  version: u64,
  notify: watch::Sender<u64>,
}

impl Entry {
  fn new(tags: &[Tag]) -> Self {
    let (notify, _rx) = watch::channel(0);
    Self {
      data: None,
      tags: tags.to_vec(),
      stale: false,
      fetched_at: None,
      in_flight: false,
      last_error: None,
      subscribers: 0,
      version: 0,
      notify,
    }
  }

  fn bump(&mut self) {
    self.version += 1;
    // send_replace works even with no receivers attached
    self.notify.send_replace(self.version);
  }
}

/// Outcome of a lookup, telling the cache layer what to do next.
pub(crate) enum Lookup {
  /// The entry holds a value that has not been invalidated.
  Fresh {
    data: Value,
    fetched_at: DateTime<Utc>,
  },
  /// Nobody is fetching this key; the caller now owns the fetch.
  MustFetch,
  /// Another caller is already fetching; wait on the receiver and retry.
  InFlight(watch::Receiver<u64>),
  /// The shared in-flight request failed; waiters inherit its error.
  Failed(String),
}

/// Snapshot of an entry's value for subscribers.
pub(crate) struct Snapshot {
  pub data: Value,
  pub fetched_at: DateTime<Utc>,
  pub stale: bool,
}

/// Process-wide keyed map of cache entries.
///
/// Entries are created on first lookup or subscription and persist until
/// [`MemoryStore::evict_unreferenced`] sweeps the ones with no subscribers.
#[derive(Default)]
pub(crate) struct MemoryStore {
  entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
  fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("cache store lock poisoned: {}", e))
  }

  /// Look up a key, claiming the fetch if nobody else holds it.
  ///
  /// `after_wait` distinguishes a caller that was parked behind a shared
  /// in-flight request: such a caller inherits the shared failure instead of
  /// silently starting a second request.
  pub(crate) fn lookup(&self, key: &str, tags: &[Tag], after_wait: bool) -> Result<Lookup> {
    let mut entries = self.lock()?;
    let entry = entries
      .entry(key.to_string())
      .or_insert_with(|| Entry::new(tags));

    if !entry.stale {
      if let Some(data) = &entry.data {
        return Ok(Lookup::Fresh {
          data: data.clone(),
          fetched_at: entry.fetched_at.unwrap_or_else(Utc::now),
        });
      }
    }

    if entry.in_flight {
      return Ok(Lookup::InFlight(entry.notify.subscribe()));
    }

    if after_wait {
      if let Some(message) = entry.last_error.clone() {
        return Ok(Lookup::Failed(message));
      }
    }

    entry.in_flight = true;
    entry.last_error = None;
    Ok(Lookup::MustFetch)
  }

  /// Store the result of a fetch and wake every waiter and subscriber.
  pub(crate) fn complete(&self, key: &str, value: Value) -> Result<()> {
    let mut entries = self.lock()?;
    if let Some(entry) = entries.get_mut(key) {
      entry.data = Some(value);
      entry.stale = false;
      entry.fetched_at = Some(Utc::now());
      entry.in_flight = false;
      entry.last_error = None;
      entry.bump();
    }
    Ok(())
  }

  /// Record a failed fetch so parked waiters inherit the error.
  pub(crate) fn fail(&self, key: &str, message: String) -> Result<()> {
    let mut entries = self.lock()?;
    if let Some(entry) = entries.get_mut(key) {
      entry.in_flight = false;
      entry.last_error = Some(message);
      entry.bump();
    }
    Ok(())
  }

  /// Mark every entry sharing one of `tags` stale. Returns how many entries
  /// were marked. Stale entries are refetched on next access.
  pub(crate) fn invalidate(&self, tags: &[Tag]) -> Result<usize> {
    let mut entries = self.lock()?;
    let mut marked = 0;
    for entry in entries.values_mut() {
      if !entry.stale && entry.tags.iter().any(|t| tags.contains(t)) {
        entry.stale = true;
        entry.bump();
        marked += 1;
      }
    }
    Ok(marked)
  }

  /// Register a subscriber for a key and return its change receiver.
  pub(crate) fn subscribe(&self, key: &str, tags: &[Tag]) -> Result<watch::Receiver<u64>> {
    let mut entries = self.lock()?;
    let entry = entries
      .entry(key.to_string())
      .or_insert_with(|| Entry::new(tags));
    entry.subscribers += 1;
    Ok(entry.notify.subscribe())
  }

  /// Drop one subscriber from a key. Called from `Subscription::drop`, so it
  /// must not fail; a poisoned lock just skips the decrement.
  pub(crate) fn unsubscribe(&self, key: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      if let Some(entry) = entries.get_mut(key) {
        entry.subscribers = entry.subscribers.saturating_sub(1);
      }
    }
  }

  /// Current value of an entry, if it has one.
  pub(crate) fn snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
    let entries = self.lock()?;
    Ok(entries.get(key).and_then(|entry| {
      entry.data.as_ref().map(|data| Snapshot {
        data: data.clone(),
        fetched_at: entry.fetched_at.unwrap_or_else(Utc::now),
        stale: entry.stale,
      })
    }))
  }

  /// Drop every entry with no subscribers and no fetch in flight. Returns how
  /// many entries were removed.
  ///
  /// There is no size bound and no automatic sweep: one-shot results stay
  /// around so repeated queries hit the cache.
  pub(crate) fn evict_unreferenced(&self) -> Result<usize> {
    let mut entries = self.lock()?;
    let before = entries.len();
    entries.retain(|_, entry| entry.subscribers > 0 || entry.in_flight);
    Ok(before - entries.len())
  }

  /// Number of entries currently in the store.
  pub(crate) fn len(&self) -> Result<usize> {
    Ok(self.lock()?.len())
  }

  pub(crate) fn is_empty(&self) -> Result<bool> {
    Ok(self.lock()?.is_empty())
  }

  /// Subscriber count for a key, if the entry exists.
  pub(crate) fn subscriber_count(&self, key: &str) -> Result<Option<usize>> {
    Ok(self.lock()?.get(key).map(|e| e.subscribers))
  }
}
