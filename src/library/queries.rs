//! Query keys and tag wiring for the library API.

use sha2::{Digest, Sha256};

use crate::cache::{QueryKey, Tag};

/// Tags invalidated by book mutations (create, update, delete).
pub const BOOK_MUTATION_TAGS: &[Tag] = &[Tag::Books];

/// Tags invalidated by a borrow: the summary changes and so does the book's
/// copy count.
pub const BORROW_MUTATION_TAGS: &[Tag] = &[Tag::BorrowBooks, Tag::Books];

/// Query key types for the library API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryQuery {
  /// Paginated book list
  Books { page: u32, limit: u32 },
  /// Single book by id
  BookDetail { id: String },
  /// Genre strings the server accepts
  Genres,
  /// Total quantity borrowed per book
  BorrowSummary,
}

impl QueryKey for LibraryQuery {
  fn cache_key(&self) -> String {
    let input = match self {
      Self::Books { page, limit } => format!("books:{}:{}", page, limit),
      Self::BookDetail { id } => format!("book_detail:{}", normalize_id(id)),
      Self::Genres => "genres".to_string(),
      Self::BorrowSummary => "borrow_summary".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::Books { page, limit } => format!("books page {} (limit {})", page, limit),
      Self::BookDetail { id } => format!("book {}", id),
      Self::Genres => "genres".to_string(),
      Self::BorrowSummary => "borrow summary".to_string(),
    }
  }

  fn tags(&self) -> &'static [Tag] {
    match self {
      Self::Books { .. } | Self::BookDetail { .. } | Self::Genres => &[Tag::Books],
      Self::BorrowSummary => &[Tag::BorrowBooks],
    }
  }
}

/// Normalize an id for consistent hashing.
fn normalize_id(id: &str) -> String {
  id.trim().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_same_arguments_share_a_key() {
    let a = LibraryQuery::Books { page: 1, limit: 10 };
    let b = LibraryQuery::Books { page: 1, limit: 10 };
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_different_arguments_get_distinct_keys() {
    let page1 = LibraryQuery::Books { page: 1, limit: 10 };
    let page2 = LibraryQuery::Books { page: 2, limit: 10 };
    assert_ne!(page1.cache_key(), page2.cache_key());

    let detail = LibraryQuery::BookDetail {
      id: "abc".to_string(),
    };
    assert_ne!(page1.cache_key(), detail.cache_key());
  }

  #[test]
  fn test_id_whitespace_does_not_split_entries() {
    let a = LibraryQuery::BookDetail {
      id: "abc".to_string(),
    };
    let b = LibraryQuery::BookDetail {
      id: " abc ".to_string(),
    };
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_book_queries_depend_on_books_tag() {
    let queries = [
      LibraryQuery::Books { page: 1, limit: 5 },
      LibraryQuery::BookDetail {
        id: "abc".to_string(),
      },
      LibraryQuery::Genres,
    ];
    for query in &queries {
      assert_eq!(query.tags(), &[Tag::Books]);
    }
    assert_eq!(LibraryQuery::BorrowSummary.tags(), &[Tag::BorrowBooks]);
  }

  #[test]
  fn test_borrow_invalidates_both_resources() {
    assert!(BORROW_MUTATION_TAGS.contains(&Tag::Books));
    assert!(BORROW_MUTATION_TAGS.contains(&Tag::BorrowBooks));
    assert!(!BOOK_MUTATION_TAGS.contains(&Tag::BorrowBooks));
  }
}
