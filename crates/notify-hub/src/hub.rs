//! The central registry and dispatcher: one command-processing task owns
//! `{clients, subscriptions}` and serializes every mutation through it.

use crate::client::Client;
use crate::metrics::HubMetrics;
use notify_protocol::{Event, EventKind};
use prometheus::Registry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug)]
pub enum HubError {
    InvalidWorkerPoolSize,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::InvalidWorkerPoolSize => write!(f, "worker_pool_size must be greater than 0"),
        }
    }
}

impl std::error::Error for HubError {}

struct SubscriptionCommand {
    client_id: u64,
    types: Vec<EventKind>,
}

/// Cheap to clone: every field is a channel sender. Safe to hand out
/// as `axum::extract::State<Hub>`.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::UnboundedSender<Arc<Client>>,
    unregister_tx: mpsc::UnboundedSender<u64>,
    subscribe_tx: mpsc::UnboundedSender<SubscriptionCommand>,
    unsubscribe_tx: mpsc::UnboundedSender<SubscriptionCommand>,
    event_tx: mpsc::Sender<Event>,
    close_tx: watch::Sender<bool>,
    metrics: Arc<HubMetrics>,
}

const EVENT_QUEUE_CAPACITY: usize = 1024;

impl Hub {
    /// Creates the hub's channels and immediately spawns its single
    /// command-processing task with a worker pool of `worker_pool_size`
    /// permits for bounded-concurrency event dispatch.
    pub fn new(worker_pool_size: usize) -> Result<Self, HubError> {
        if worker_pool_size == 0 {
            return Err(HubError::InvalidWorkerPoolSize);
        }

        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (close_tx, close_rx) = watch::channel(false);
        let metrics = Arc::new(HubMetrics::new());

        tokio::spawn(run_loop(
            worker_pool_size,
            register_rx,
            unregister_rx,
            subscribe_rx,
            unsubscribe_rx,
            event_rx,
            close_rx,
            metrics.clone(),
        ));

        Ok(Self {
            register_tx,
            unregister_tx,
            subscribe_tx,
            unsubscribe_tx,
            event_tx,
            close_tx,
            metrics,
        })
    }

    /// Prometheus registry backing `active_connections`/`active_subscription`.
    #[must_use]
    pub fn metrics_registry(&self) -> &Registry {
        self.metrics.registry()
    }

    /// Wires `on_close`/`on_subscribe`/`on_unsubscribe` into the client,
    /// then enqueues the register command.
    pub fn register(&self, client: Arc<Client>) {
        let id = client.id();

        let unregister_tx = self.unregister_tx.clone();
        let unsubscribe_tx = self.unsubscribe_tx.clone();
        client.on_close(move || {
            let _ = unsubscribe_tx.send(SubscriptionCommand {
                client_id: id,
                types: EventKind::ALL.to_vec(),
            });
            let _ = unregister_tx.send(id);
        });

        let subscribe_tx = self.subscribe_tx.clone();
        client.on_subscribe(move |params| {
            let _ = subscribe_tx.send(SubscriptionCommand {
                client_id: id,
                types: parse_event_kinds(&params),
            });
        });

        let unsubscribe_tx = self.unsubscribe_tx.clone();
        client.on_unsubscribe(move |params| {
            let _ = unsubscribe_tx.send(SubscriptionCommand {
                client_id: id,
                types: parse_event_kinds(&params),
            });
        });

        let _ = self.register_tx.send(client);
    }

    pub fn unregister(&self, client_id: u64) {
        let _ = self.unregister_tx.send(client_id);
    }

    pub fn subscribe(&self, client_id: u64, types: Vec<EventKind>) {
        let _ = self.subscribe_tx.send(SubscriptionCommand { client_id, types });
    }

    pub fn unsubscribe(&self, client_id: u64, types: Vec<EventKind>) {
        let _ = self.unsubscribe_tx.send(SubscriptionCommand { client_id, types });
    }

    /// The one operation that can block the caller: if the event queue
    /// is full, `send_event` waits for room, matching the spec's
    /// backpressure policy (the fetcher's rate limit keeps this from
    /// saturating in steady state).
    pub async fn send_event(&self, event: Event) {
        let _ = self.event_tx.send(event).await;
    }

    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

fn parse_event_kinds(params: &[String]) -> Vec<EventKind> {
    params
        .iter()
        .filter_map(|p| EventKind::from_str(p).ok())
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    worker_pool_size: usize,
    mut register_rx: mpsc::UnboundedReceiver<Arc<Client>>,
    mut unregister_rx: mpsc::UnboundedReceiver<u64>,
    mut subscribe_rx: mpsc::UnboundedReceiver<SubscriptionCommand>,
    mut unsubscribe_rx: mpsc::UnboundedReceiver<SubscriptionCommand>,
    mut event_rx: mpsc::Receiver<Event>,
    mut close_rx: watch::Receiver<bool>,
    metrics: Arc<HubMetrics>,
) {
    let mut clients: HashMap<u64, Arc<Client>> = HashMap::new();
    let mut subscriptions: HashMap<EventKind, HashSet<u64>> = HashMap::new();
    let semaphore = Arc::new(Semaphore::new(worker_pool_size));

    loop {
        tokio::select! {
            Ok(()) = close_rx.changed() => {
                if *close_rx.borrow() {
                    break;
                }
            }
            Some(client) = register_rx.recv() => {
                clients.insert(client.id(), client);
                metrics.set_active_connections(clients.len());
                info!(active_clients = clients.len(), "hub: client registered");
            }
            Some(id) = unregister_rx.recv() => {
                clients.remove(&id);
                metrics.set_active_connections(clients.len());
                info!(active_clients = clients.len(), "hub: client unregistered");
            }
            Some(cmd) = subscribe_rx.recv() => {
                for kind in cmd.types {
                    subscriptions.entry(kind).or_default().insert(cmd.client_id);
                }
                metrics.sync_subscriptions(&subscriptions);
            }
            Some(cmd) = unsubscribe_rx.recv() => {
                for kind in cmd.types {
                    if let Some(set) = subscriptions.get_mut(&kind) {
                        set.remove(&cmd.client_id);
                        if set.is_empty() {
                            subscriptions.remove(&kind);
                        }
                    }
                }
                metrics.sync_subscriptions(&subscriptions);
            }
            Some(event) = event_rx.recv() => {
                dispatch_event(&clients, &subscriptions, &semaphore, event).await;
            }
            else => break,
        }
    }
}

/// Snapshots subscribers for `event.kind`, submits one bounded-pool task
/// per subscriber, and waits for all of them before returning — this is
/// what keeps the hub's maps consistent with respect to the next
/// command it processes.
async fn dispatch_event(
    clients: &HashMap<u64, Arc<Client>>,
    subscriptions: &HashMap<EventKind, HashSet<u64>>,
    semaphore: &Arc<Semaphore>,
    event: Event,
) {
    let Some(subscriber_ids) = subscriptions.get(&event.kind) else {
        return;
    };
    let targets: Vec<Arc<Client>> = subscriber_ids
        .iter()
        .filter_map(|id| clients.get(id).cloned())
        .collect();

    let mut dispatched = JoinSet::new();
    for client in targets {
        match semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                let payload = event.payload.clone();
                dispatched.spawn(async move {
                    let _permit = permit;
                    client.send(payload);
                });
            }
            Err(_) => {
                warn!(
                    client_id = client.id(),
                    event_type = %event.kind,
                    "hub: worker pool saturated, dropping send"
                );
            }
        }
    }

    while dispatched.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_worker_pool_size() {
        assert!(Hub::new(0).is_err());
    }

    #[tokio::test]
    async fn new_accepts_positive_worker_pool_size() {
        assert!(Hub::new(4).is_ok());
    }
}
