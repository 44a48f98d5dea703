//! Polls an [`IndexerClient`] for successive rounds under a rate limit and
//! hands each block to a processor callback in strictly ascending order.

use crate::indexer::{IndexerClient, IndexerError};
use crate::rate_limiter::RateLimiter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

const BLOCK_QUEUE_SIZE: usize = 100;
const NOT_FOUND_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct FetcherConfig {
    pub rps: u32,
    /// `None` means "use the indexer's current tip round".
    pub start_round: Option<u64>,
}

/// A running fetcher. Dropping this handle does not stop the loops —
/// call [`Fetcher::stop`] explicitly, matching the source's
/// `Start`/`Stop` lifecycle.
pub struct Fetcher {
    stop_tx: watch::Sender<bool>,
}

impl Fetcher {
    /// Resolves `start_round` (querying the indexer's tip if absent) and
    /// launches the fetch loop and process loop as independent tasks.
    pub async fn start<C, F>(
        client: Arc<C>,
        config: FetcherConfig,
        on_block: F,
    ) -> Result<Self, FetchError>
    where
        C: IndexerClient + 'static,
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let start_round = match config.start_round {
            Some(round) => round,
            None => client
                .tip_round()
                .await
                .map_err(FetchError::StartRoundLookup)?,
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(BLOCK_QUEUE_SIZE);
        let limiter = Arc::new(RateLimiter::new(config.rps));

        tokio::spawn(fetch_loop(client, start_round, limiter, queue_tx, stop_rx));
        tokio::spawn(process_loop(queue_rx, on_block));

        Ok(Self { stop_tx })
    }

    /// Signals the fetch loop to stop taking new rounds. The process loop
    /// drains whatever is already queued and then exits on its own.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn fetch_loop<C: IndexerClient>(
    client: Arc<C>,
    mut cur_round: u64,
    limiter: Arc<RateLimiter>,
    queue_tx: mpsc::Sender<Vec<u8>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        limiter.take().await;

        if *stop_rx.borrow() {
            break;
        }

        let next_round = cur_round + 1;
        match client.lookup_block(next_round).await {
            Ok(block) => {
                if queue_tx.send(block).await.is_err() {
                    break;
                }
                cur_round = next_round;
            }
            Err(IndexerError::NotFound) => {
                debug!(round = next_round, "round not yet available, retrying in 1s");
                tokio::select! {
                    () = tokio::time::sleep(NOT_FOUND_RETRY_DELAY) => {}
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            Err(err @ IndexerError::Transient(_)) => {
                warn!(round = next_round, error = %err, "fetcher: transient indexer error, retrying");
            }
        }
    }
    // Dropping queue_tx here closes the channel; process_loop drains and exits.
}

async fn process_loop<F>(mut queue_rx: mpsc::Receiver<Vec<u8>>, on_block: F)
where
    F: Fn(Vec<u8>) + Send + Sync + 'static,
{
    while let Some(block) = queue_rx.recv().await {
        on_block(block);
    }
}

#[derive(Debug)]
pub enum FetchError {
    StartRoundLookup(IndexerError),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::StartRoundLookup(e) => {
                write!(f, "failed to resolve start round from indexer tip: {e}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedIndexer {
        /// Number of times lookup_block(r+1) should return NotFound
        /// before it succeeds, keyed implicitly by call order.
        not_found_budget: AtomicU64,
        tip: u64,
        calls: AsyncMutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl IndexerClient for ScriptedIndexer {
        async fn tip_round(&self) -> Result<u64, IndexerError> {
            Ok(self.tip)
        }

        async fn lookup_block(&self, round: u64) -> Result<Vec<u8>, IndexerError> {
            self.calls.lock().await.push(round);
            if self.not_found_budget.load(Ordering::SeqCst) > 0 {
                self.not_found_budget.fetch_sub(1, Ordering::SeqCst);
                return Err(IndexerError::NotFound);
            }
            Ok(format!("{{\"round\":{round}}}").into_bytes())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_are_delivered_in_strictly_ascending_order() {
        let indexer = Arc::new(ScriptedIndexer {
            not_found_budget: AtomicU64::new(0),
            tip: 100,
            calls: AsyncMutex::new(Vec::new()),
        });
        let received: Arc<StdMutex<Vec<u64>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();

        let fetcher = Fetcher::start(
            indexer,
            FetcherConfig {
                rps: 1000,
                start_round: Some(10),
            },
            move |block| {
                let parsed: serde_json::Value = serde_json::from_slice(&block).unwrap();
                received_clone
                    .lock()
                    .unwrap()
                    .push(parsed["round"].as_u64().unwrap());
            },
        )
        .await
        .unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        fetcher.stop();

        let rounds = received.lock().unwrap().clone();
        assert!(rounds.len() >= 2);
        for pair in rounds.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test]
    async fn start_round_none_uses_indexer_tip() {
        let indexer = Arc::new(ScriptedIndexer {
            not_found_budget: AtomicU64::new(0),
            tip: 42,
            calls: AsyncMutex::new(Vec::new()),
        });
        let first_round = Arc::new(StdMutex::new(None));
        let first_round_clone = first_round.clone();

        let fetcher = Fetcher::start(
            indexer,
            FetcherConfig {
                rps: 1000,
                start_round: None,
            },
            move |block| {
                let parsed: serde_json::Value = serde_json::from_slice(&block).unwrap();
                let mut guard = first_round_clone.lock().unwrap();
                if guard.is_none() {
                    *guard = Some(parsed["round"].as_u64().unwrap());
                }
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        fetcher.stop();
        assert_eq!(*first_round.lock().unwrap(), Some(43));
    }
}
