//! A thin `reqwest`-based [`IndexerClient`] against an Algorand-indexer-
//! shaped HTTP API: `GET /health` for the tip round, `GET /v2/blocks/{round}`
//! for a single block.

use async_trait::async_trait;
use notify_fetcher::{IndexerClient, IndexerError};
use reqwest::StatusCode;
use serde::Deserialize;

pub struct HttpIndexerClient {
    http: reqwest::Client,
    host: String,
    api_token: String,
}

impl HttpIndexerClient {
    #[must_use]
    pub fn new(host: String, api_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            host,
            api_token,
        }
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        if self.api_token.is_empty() {
            builder
        } else {
            builder.header("X-Algo-API-Token", &self.api_token)
        }
    }
}

#[derive(Deserialize)]
struct HealthResponse {
    round: u64,
}

#[async_trait]
impl IndexerClient for HttpIndexerClient {
    async fn tip_round(&self) -> Result<u64, IndexerError> {
        let resp = self
            .request(format!("{}/health", self.host))
            .send()
            .await
            .map_err(|e| IndexerError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexerError::Transient(format!(
                "health check returned {}",
                resp.status()
            )));
        }

        let body: HealthResponse = resp
            .json()
            .await
            .map_err(|e| IndexerError::Transient(format!("invalid health response: {e}")))?;
        Ok(body.round)
    }

    async fn lookup_block(&self, round: u64) -> Result<Vec<u8>, IndexerError> {
        let resp = self
            .request(format!("{}/v2/blocks/{round}", self.host))
            .send()
            .await
            .map_err(|e| IndexerError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(IndexerError::NotFound),
            status if status.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| IndexerError::Transient(e.to_string())),
            status => Err(IndexerError::Transient(format!("lookup_block returned {status}"))),
        }
    }
}
