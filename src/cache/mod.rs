// src/cache/mod.rs
// Caching layer for external knowledge

pub mod external;

pub use external::{normalize_query, CacheEntry, ExternalResultCache, EXTERNAL_CACHE_COLLECTION};
