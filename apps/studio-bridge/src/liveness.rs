use std::sync::Arc;
use std::time::Duration;

use bridge_proto::ConnectionStatus;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Last-contact bookkeeping per client id.
///
/// A client is connected while its most recent poll or ping is no older
/// than the window (inclusive). Nothing else changes the answer.
pub struct LivenessTracker {
    window: Duration,
    last_seen: DashMap<String, Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub client_id: String,
    pub connected: bool,
    pub last_seen_seconds: f64,
}

impl LivenessTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn touch(&self, client_id: &str) {
        let now = Instant::now();
        match self.last_seen.get_mut(client_id) {
            Some(mut seen) => *seen = now,
            None => {
                self.last_seen.insert(client_id.to_string(), now);
            }
        }
    }

    /// Time since the client last made contact, if it ever did.
    pub fn last_seen_age(&self, client_id: &str) -> Option<Duration> {
        self.last_seen
            .get(client_id)
            .map(|seen| Instant::now().saturating_duration_since(*seen))
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.last_seen_age(client_id)
            .is_some_and(|age| age <= self.window)
    }

    pub fn status(&self, client_id: &str) -> ConnectionStatus {
        let age = self.last_seen_age(client_id);
        ConnectionStatus {
            connected: age.is_some_and(|age| age <= self.window),
            client_id: client_id.to_string(),
            last_seen_seconds: age.map(|age| round_tenths(age.as_secs_f64())),
        }
    }

    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        let now = Instant::now();
        let mut clients: Vec<ClientSnapshot> = self
            .last_seen
            .iter()
            .map(|entry| {
                let age = now.saturating_duration_since(*entry.value());
                ClientSnapshot {
                    client_id: entry.key().clone(),
                    connected: age <= self.window,
                    last_seen_seconds: round_tenths(age.as_secs_f64()),
                }
            })
            .collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        clients
    }

    /// Forgets clients silent for longer than `max_age`. Returns how many
    /// were dropped.
    pub fn prune(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) <= max_age);
        before.saturating_sub(self.last_seen.len())
    }

    /// Periodically prunes clients that have been gone for `max_age`.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration, max_age: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        let mut interval = tokio::time::interval(every);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                let dropped = tracker.prune(max_age);
                if dropped > 0 {
                    debug!(dropped, "pruned silent clients");
                }
            }
        })
    }
}

fn round_tenths(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}
