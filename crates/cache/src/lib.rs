//! Memoization caches for the build and execution stages
//!
//! Rebuilding or re-running an identical flag set is the dominant cost of a
//! flag search. [`MemoCache`] guarantees that the expensive computation for a
//! checksum runs at most once for the lifetime of the cache: concurrent
//! callers for the same key wait on the in-flight computation and reuse its
//! result, and failures are cached just like successes.

pub mod memo;
pub mod stats;

pub use memo::{EntryState, MemoCache};
pub use stats::{CacheStatSnapshot, CacheStats};
