//! Cache Module
//!
//! In-process response cache keyed by request URL, with TTL expiration,
//! bounded capacity and substring invalidation.

mod entry;
mod order;
mod stats;
mod store;


use thiserror::Error;

// Re-export public types
pub use entry::{CacheEntry, CachedResponse};
pub use order::InsertionOrder;
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed key length in bytes. Longer URLs are never cached.
pub const MAX_KEY_LENGTH: usize = 2048;

// == Cache Error ==
/// Reasons a value could not be stored.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// Key is longer than `MAX_KEY_LENGTH`
    #[error("Key exceeds maximum length of {} bytes", MAX_KEY_LENGTH)]
    KeyTooLong,

    /// Capacity is zero, nothing can be stored
    #[error("Cache is full and eviction failed")]
    CacheFull,
}
