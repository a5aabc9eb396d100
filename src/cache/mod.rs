//! Cache Module
//!
//! Provides in-memory caching with TTL expiration checked on read, plus
//! cache-key derivation.

mod entry;
mod key;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use key::CacheKey;
pub use stats::CacheStats;
pub use store::CacheStore;
