use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::broker::JobBroker;
use crate::liveness::LivenessTracker;

/// Shared by the HTTP routes and the MCP server.
#[derive(Clone)]
pub struct AppState {
    start: Instant,
    broker: Arc<JobBroker>,
    default_client_id: Arc<str>,
    poll_timeout: Duration,
}

impl AppState {
    pub fn new(broker: Arc<JobBroker>, default_client_id: &str, poll_timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            broker,
            default_client_id: Arc::from(default_client_id),
            poll_timeout,
        }
    }

    pub fn broker(&self) -> &Arc<JobBroker> {
        &self.broker
    }

    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        self.broker.liveness()
    }

    pub fn default_client_id(&self) -> &str {
        &self.default_client_id
    }

    /// `requested` when it names a client, the configured default otherwise.
    pub fn client_id_or_default<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.default_client_id())
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Wall-clock unix time in fractional seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
