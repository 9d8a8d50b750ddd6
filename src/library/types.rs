//! Domain types and response envelopes for the library API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A book as the server owns it.
///
/// `available` tracks `copies > 0` and is maintained exclusively by the
/// server; the client never computes or mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
  #[serde(rename = "_id")]
  pub id: String,
  pub title: String,
  pub author: String,
  /// Enum-like string, e.g. "FANTASY"; the set comes from `/books/genres`.
  pub genre: String,
  pub isbn: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub copies: u32,
  pub available: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// The client-writable subset of a book, sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFields {
  pub title: String,
  pub author: String,
  pub genre: String,
  pub isbn: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub copies: u32,
  pub available: bool,
}

/// Payload for borrowing copies of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
  /// Book id
  pub book: String,
  pub quantity: u32,
  pub due_date: DateTime<Utc>,
}

/// Server-side aggregate: total quantity borrowed per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowSummaryItem {
  pub book: BorrowedBook,
  pub total_quantity: u32,
}

/// The public book fields echoed in a borrow summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowedBook {
  pub title: String,
  pub isbn: String,
}

/// Envelope for paginated list responses: `{ data, meta }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
  pub data: Vec<T>,
  pub meta: Meta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Meta {
  pub total: u64,
  pub page: u32,
  pub limit: u32,
}

impl Meta {
  /// ceil(total / limit); 0 when the limit is 0.
  pub fn total_pages(&self) -> u64 {
    if self.limit == 0 {
      0
    } else {
      self.total.div_ceil(u64::from(self.limit))
    }
  }
}

/// Envelope for single-resource reads: `{ data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEnvelope<T> {
  pub data: T,
}

/// Envelope for mutations that return the affected resource:
/// `{ success, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEnvelope<T> {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
  // The path form keeps the derive from demanding T: Default
  #[serde(default = "Option::default")]
  pub data: Option<T>,
}

/// Envelope for mutations that only acknowledge: `{ success }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEnvelope {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
}
