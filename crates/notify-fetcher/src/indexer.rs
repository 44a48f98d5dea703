//! The abstract capability the fetcher polls. Kept as a trait so the
//! polling/backoff logic in [`crate::fetcher::Fetcher`] never depends on a
//! concrete HTTP client — the `monitor` binary wires in the real one.

use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Returns the indexer's current tip round.
    async fn tip_round(&self) -> Result<u64, IndexerError>;

    /// Fetches the block at `round`, or `IndexerError::NotFound` if the
    /// indexer has not produced it yet.
    async fn lookup_block(&self, round: u64) -> Result<Vec<u8>, IndexerError>;
}

#[derive(Debug)]
pub enum IndexerError {
    /// The round has not been produced yet; retry after a short delay
    /// without advancing the current round.
    NotFound,
    /// Any other transport or server failure; retry on the next
    /// rate-limit tick without advancing the current round.
    Transient(String),
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerError::NotFound => write!(f, "round not yet available"),
            IndexerError::Transient(s) => write!(f, "indexer request failed: {s}"),
        }
    }
}

impl std::error::Error for IndexerError {}
