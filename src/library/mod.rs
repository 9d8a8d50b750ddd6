//! Typed client for the library management API, with and without caching.

pub mod cached_client;
pub mod client;
pub mod queries;
pub mod types;

pub use cached_client::CachedLibraryClient;
pub use client::LibraryClient;
pub use queries::LibraryQuery;
