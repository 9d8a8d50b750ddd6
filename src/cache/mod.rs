//! Query cache with tag-based invalidation.
//!
//! This module keeps client views consistent with server state:
//! - Queries are cached in a process-wide keyed map (operation + arguments)
//! - Each query carries the resource tags it depends on
//! - Mutations invalidate tags; stale entries refetch on next access
//! - Concurrent identical queries share one in-flight request
//! - Subscribers hold reference counts and are notified on every change
//!
//! There is no optimistic update and no manual cache patching; invalidation
//! is the sole consistency mechanism.

mod layer;
mod store;
mod traits;

pub use layer::{QueryCache, Subscription};
pub use traits::{FetchResult, FetchSource, QueryKey, Tag};
