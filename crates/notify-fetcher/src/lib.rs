//! Rate-limited, gap-tolerant block polling.
//!
//! Nothing in this crate talks to Redis or the hub; it only needs an
//! [`IndexerClient`] implementation and a processor callback.

pub mod fetcher;
pub mod indexer;
pub mod rate_limiter;

pub use fetcher::{FetchError, Fetcher, FetcherConfig};
pub use indexer::{IndexerClient, IndexerError};
pub use rate_limiter::RateLimiter;
