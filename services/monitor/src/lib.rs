pub mod indexer_client;
pub mod metrics;

pub use indexer_client::HttpIndexerClient;
