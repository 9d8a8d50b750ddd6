//! Client-side data synchronization for a library management REST API.
//!
//! The core is a typed API client ([`library::LibraryClient`]) wrapped by a
//! process-wide query cache with tag-based invalidation ([`cache`]): reads
//! are cached per operation+arguments, mutations invalidate the resource
//! tags they touch, and stale entries refetch on next access. The [`cli`]
//! module is the view layer on top.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod validate;
