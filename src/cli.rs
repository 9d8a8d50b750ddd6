//! Command-line surface: one subcommand per API operation.
//!
//! This is the view layer. Forms validate locally before anything is sent;
//! transport and server failures surface as one "Failed to X. Please try
//! again." notification and are logged.

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use color_eyre::{
  eyre::{eyre, Report},
  Result,
};

use crate::library::types::{Book, BorrowSummaryItem};
use crate::library::CachedLibraryClient;
use crate::validate::{BookDraft, BorrowDraft, FieldError};

#[derive(Debug, Subcommand)]
pub enum Command {
  /// List books
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Books per page
    #[arg(long)]
    limit: Option<u32>,
  },
  /// Show a single book
  Show { id: String },
  /// Add a book
  Add {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    /// Genre string, e.g. FANTASY (see `genres`)
    #[arg(long)]
    genre: String,
    #[arg(long)]
    isbn: String,
    #[arg(long)]
    description: String,
    #[arg(long, default_value_t = 1)]
    copies: u32,
  },
  /// Edit a book; omitted fields keep their current values
  Edit {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    genre: Option<String>,
    #[arg(long)]
    isbn: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    copies: Option<u32>,
  },
  /// Delete a book
  Delete { id: String },
  /// List the genres the server accepts
  Genres,
  /// Borrow copies of a book
  Borrow {
    id: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    /// Due date: RFC 3339 or YYYY-MM-DD (end of day, UTC)
    #[arg(long)]
    due: String,
  },
  /// Total quantity borrowed per book
  Summary,
}

pub async fn run(command: Command, client: &CachedLibraryClient, page_size: u32) -> Result<()> {
  match command {
    Command::List { page, limit } => list(client, page, limit.unwrap_or(page_size)).await,
    Command::Show { id } => show(client, &id).await,
    Command::Add {
      title,
      author,
      genre,
      isbn,
      description,
      copies,
    } => {
      let draft = BookDraft {
        title,
        author,
        genre,
        isbn,
        description,
        copies,
        // New books start available; the server keeps this in sync with
        // the copy count from here on.
        available: true,
      };
      add(client, draft).await
    }
    Command::Edit {
      id,
      title,
      author,
      genre,
      isbn,
      description,
      copies,
    } => {
      edit(
        client,
        &id,
        EditFields {
          title,
          author,
          genre,
          isbn,
          description,
          copies,
        },
      )
      .await
    }
    Command::Delete { id } => delete(client, &id).await,
    Command::Genres => genres(client).await,
    Command::Borrow { id, quantity, due } => borrow(client, &id, quantity, &due).await,
    Command::Summary => summary(client).await,
  }
}

/// Optional overrides for `edit`.
struct EditFields {
  title: Option<String>,
  author: Option<String>,
  genre: Option<String>,
  isbn: Option<String>,
  description: Option<String>,
  copies: Option<u32>,
}

async fn list(client: &CachedLibraryClient, page: u32, limit: u32) -> Result<()> {
  let listing = client
    .list_books(page, limit)
    .await
    .map_err(|e| notify_failure(e, "load books"))?;

  for book in &listing.data {
    print_book_row(book);
  }
  println!(
    "page {} of {} ({} books total)",
    listing.meta.page,
    listing.meta.total_pages(),
    listing.meta.total
  );
  Ok(())
}

async fn show(client: &CachedLibraryClient, id: &str) -> Result<()> {
  let book = client
    .get_book(Some(id))
    .await
    .map_err(|e| notify_failure(e, "load book"))?
    .ok_or_else(|| eyre!("no book id provided"))?;

  println!("{:12} {}", "id", book.id);
  println!("{:12} {}", "title", book.title);
  println!("{:12} {}", "author", book.author);
  println!("{:12} {}", "genre", book.genre);
  println!("{:12} {}", "isbn", book.isbn);
  if let Some(description) = &book.description {
    println!("{:12} {}", "description", description);
  }
  println!("{:12} {}", "copies", book.copies);
  println!(
    "{:12} {}",
    "available",
    if book.available { "yes" } else { "no" }
  );
  Ok(())
}

async fn add(client: &CachedLibraryClient, draft: BookDraft) -> Result<()> {
  reject_invalid(draft.check())?;

  let book = client
    .create_book(&draft.into_fields())
    .await
    .map_err(|e| notify_failure(e, "create book"))?;

  println!("Book created successfully!");
  print_book_row(&book);
  Ok(())
}

async fn edit(client: &CachedLibraryClient, id: &str, fields: EditFields) -> Result<()> {
  let book = client
    .get_book(Some(id))
    .await
    .map_err(|e| notify_failure(e, "load book"))?
    .ok_or_else(|| eyre!("no book id provided"))?;

  let draft = BookDraft {
    title: fields.title.unwrap_or(book.title),
    author: fields.author.unwrap_or(book.author),
    genre: fields.genre.unwrap_or(book.genre),
    isbn: fields.isbn.unwrap_or(book.isbn),
    description: fields
      .description
      .or(book.description)
      .unwrap_or_default(),
    copies: fields.copies.unwrap_or(book.copies),
    // Availability is server-owned; echo the current value back.
    available: book.available,
  };
  reject_invalid(draft.check())?;

  let updated = client
    .update_book(&book.id, &draft.into_fields())
    .await
    .map_err(|e| notify_failure(e, "update book"))?;

  println!("Book updated successfully!");
  print_book_row(&updated);
  Ok(())
}

async fn delete(client: &CachedLibraryClient, id: &str) -> Result<()> {
  client
    .delete_book(id)
    .await
    .map_err(|e| notify_failure(e, "delete book"))?;

  println!("Book deleted successfully!");
  Ok(())
}

async fn genres(client: &CachedLibraryClient) -> Result<()> {
  let genres = client
    .list_genres()
    .await
    .map_err(|e| notify_failure(e, "load genres"))?;

  for genre in genres {
    println!("{}", genre);
  }
  Ok(())
}

async fn borrow(client: &CachedLibraryClient, id: &str, quantity: u32, due: &str) -> Result<()> {
  let due_date = parse_due_date(due)?;
  let draft = BorrowDraft { quantity, due_date };
  reject_invalid(draft.check())?;

  client
    .borrow_book(id, due_date, quantity)
    .await
    .map_err(|e| notify_failure(e, "borrow book"))?;

  println!("Book borrowed successfully!");
  Ok(())
}

async fn summary(client: &CachedLibraryClient) -> Result<()> {
  let items = client
    .borrow_summary()
    .await
    .map_err(|e| notify_failure(e, "load borrow summary"))?;

  for item in &items {
    print_summary_row(item);
  }
  println!("{} borrowed title(s)", items.len());
  Ok(())
}

/// Block submission on field-level failures; nothing reaches the network.
fn reject_invalid(errors: Vec<FieldError>) -> Result<()> {
  if errors.is_empty() {
    return Ok(());
  }
  for error in &errors {
    eprintln!("  {}", error);
  }
  Err(eyre!(
    "{} field(s) failed validation; nothing was submitted",
    errors.len()
  ))
}

/// The user-visible notification for a failed action.
fn notify_failure(err: Report, action: &str) -> Report {
  tracing::error!(error = %err, action, "operation failed");
  err.wrap_err(format!("Failed to {}. Please try again.", action))
}

/// Accept RFC 3339 timestamps or bare dates (taken as end of day, UTC).
fn parse_due_date(input: &str) -> Result<DateTime<Utc>> {
  if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
    return Ok(timestamp.with_timezone(&Utc));
  }

  if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
    let end_of_day = date
      .and_hms_opt(23, 59, 59)
      .ok_or_else(|| eyre!("invalid time for date {}", input))?;
    return Ok(end_of_day.and_utc());
  }

  Err(eyre!(
    "could not parse due date '{}'; use RFC 3339 or YYYY-MM-DD",
    input
  ))
}

fn print_book_row(book: &Book) {
  println!(
    "{}  {:30} {:20} {:10} copies {:3}  {}",
    book.id,
    book.title,
    book.author,
    book.genre,
    book.copies,
    if book.available {
      "available"
    } else {
      "unavailable"
    }
  );
}

fn print_summary_row(item: &BorrowSummaryItem) {
  println!(
    "{:30} {:15} borrowed {}",
    item.book.title, item.book.isbn, item.total_quantity
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_due_date_rfc3339() {
    let parsed = parse_due_date("2027-01-02T03:04:05Z").unwrap();
    assert_eq!(parsed.to_rfc3339(), "2027-01-02T03:04:05+00:00");
  }

  #[test]
  fn test_parse_due_date_bare_date_is_end_of_day() {
    let parsed = parse_due_date("2027-01-02").unwrap();
    assert_eq!(parsed.to_rfc3339(), "2027-01-02T23:59:59+00:00");
  }

  #[test]
  fn test_parse_due_date_rejects_garbage() {
    assert!(parse_due_date("next tuesday").is_err());
  }
}
