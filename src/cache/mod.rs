//! Request cache for the data-access layer.
//!
//! Query results are cached as JSON values keyed by a deterministic
//! serialization of the query. Entries expire after a fixed TTL and are evicted
//! lazily on lookup; writes invalidate by key substring.
//!
//! ```toml
//! [cache]
//! ttl_ms = 300000
//! batch_window_ms = 50
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::QueryKey;
pub use store::CacheStore;
