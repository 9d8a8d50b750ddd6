//! Local form validation, run before any request is built.
//!
//! Failures are field-scoped and block submission; they never reach the API
//! client core.

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::library::types::BookFields;

/// A validation failure scoped to one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub field: String,
  pub message: String,
}

impl std::fmt::Display for FieldError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

/// Book form input, as typed by the user.
#[derive(Debug, Clone, Validate)]
pub struct BookDraft {
  #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
  pub title: String,
  #[validate(length(min = 3, message = "Author must be at least 3 characters"))]
  pub author: String,
  #[validate(length(min = 1, message = "Genre is required"))]
  pub genre: String,
  #[validate(length(min = 1, message = "ISBN is required"))]
  pub isbn: String,
  #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
  pub description: String,
  /// Unsigned, so the "copies >= 0" rule holds by construction.
  pub copies: u32,
  pub available: bool,
}

impl BookDraft {
  /// Field-scoped failures; empty means the draft may be submitted.
  pub fn check(&self) -> Vec<FieldError> {
    collect(self.validate())
  }

  /// The request payload for a draft that passed validation.
  pub fn into_fields(self) -> BookFields {
    BookFields {
      title: self.title,
      author: self.author,
      genre: self.genre,
      isbn: self.isbn,
      description: Some(self.description),
      copies: self.copies,
      available: self.available,
    }
  }
}

/// Borrow form input.
#[derive(Debug, Clone, Validate)]
pub struct BorrowDraft {
  #[validate(range(min = 1, message = "Quantity must be at least 1"))]
  pub quantity: u32,
  pub due_date: DateTime<Utc>,
}

impl BorrowDraft {
  /// Field-scoped failures; empty means the draft may be submitted.
  ///
  /// The due date must be strictly after the current time. (An earlier
  /// upstream revision accepted past dates; that was a defect, not a rule
  /// to keep.)
  pub fn check(&self) -> Vec<FieldError> {
    let mut errors = collect(self.validate());
    if self.due_date <= Utc::now() {
      errors.push(FieldError {
        field: "due_date".to_string(),
        message: "Due date must be in the future".to_string(),
      });
    }
    errors
  }
}

fn collect(result: Result<(), validator::ValidationErrors>) -> Vec<FieldError> {
  let errors = match result {
    Ok(()) => return Vec::new(),
    Err(errors) => errors,
  };

  let mut out: Vec<FieldError> = errors
    .field_errors()
    .into_iter()
    .flat_map(|(field, field_errors)| {
      field_errors.iter().map(move |error| FieldError {
        field: field.to_string(),
        message: error
          .message
          .as_ref()
          .map(|m| m.to_string())
          .unwrap_or_else(|| error.code.to_string()),
      })
    })
    .collect();

  // field_errors() iterates a map; sort for stable output
  out.sort_by(|a, b| a.field.cmp(&b.field));
  out
}
