//! Prometheus gauges tracking the hub's live registry and subscription
//! index. Updated only from the run loop, same as `clients`/`subscriptions`
//! themselves, so the numbers are never subject to a data race.

use notify_protocol::EventKind;
use prometheus::{IntGauge, IntGaugeVec, Opts, Registry};
use std::collections::HashMap;

pub struct HubMetrics {
    registry: Registry,
    active_connections: IntGauge,
    active_subscription: IntGaugeVec,
}

impl HubMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let active_connections = IntGauge::new(
            "active_connections",
            "Number of websocket clients currently registered with the hub.",
        )
        .expect("static metric name/help are valid");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("metric registered exactly once");

        let active_subscription = IntGaugeVec::new(
            Opts::new(
                "active_subscription",
                "Number of clients subscribed to each event kind.",
            ),
            &["name"],
        )
        .expect("static metric name/help/labels are valid");
        registry
            .register(Box::new(active_subscription.clone()))
            .expect("metric registered exactly once");

        Self {
            registry,
            active_connections,
            active_subscription,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_active_connections(&self, count: usize) {
        self.active_connections.set(count as i64);
    }

    /// Resyncs every label's gauge value from the authoritative
    /// subscription map, zeroing kinds that are no longer present (an
    /// absent key in `subscriptions` must read back as zero, not as a
    /// stale last value).
    pub fn sync_subscriptions(&self, subscriptions: &HashMap<EventKind, std::collections::HashSet<u64>>) {
        for kind in EventKind::ALL {
            let count = subscriptions.get(&kind).map_or(0, std::collections::HashSet::len);
            self.active_subscription
                .with_label_values(&[kind.as_ref()])
                .set(count as i64);
        }
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}
