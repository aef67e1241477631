use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::BridgeClient;
use crate::handler::HandlerRegistry;

const MIN_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Host side of the link: long-poll, run the job, post the result, repeat.
///
/// Each job runs on its own task so a slow handler never delays the next
/// poll. Transport failures back off exponentially; an idle poll is not a
/// failure.
pub struct PollLoop {
    client: BridgeClient,
    registry: Arc<HandlerRegistry>,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl PollLoop {
    pub fn new(client: BridgeClient, registry: HandlerRegistry) -> Self {
        Self {
            client,
            registry: Arc::new(registry),
            min_backoff: MIN_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max.max(min);
        self
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let client_id = self.client.client_id().to_string();
        match self.client.ping().await {
            Ok(_) => info!(target = "harness.poll", client_id = %client_id, "bridge reachable"),
            Err(err) => warn!(
                target = "harness.poll",
                client_id = %client_id,
                error = %err,
                "bridge not reachable yet"
            ),
        }

        let mut backoff = self.min_backoff;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                polled = self.client.poll() => polled,
            };
            match polled {
                Ok(Some(job)) => {
                    backoff = self.min_backoff;
                    debug!(
                        target = "harness.poll",
                        job_id = %job.job_id,
                        job_type = %job.job_type,
                        "job received"
                    );
                    let client = self.client.clone();
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        let result = registry.dispatch(job).await;
                        if let Err(err) = client.post_result(&result).await {
                            warn!(
                                target = "harness.poll",
                                job_id = %result.job_id,
                                error = %err,
                                "failed to post job result"
                            );
                        }
                    });
                }
                Ok(None) => backoff = self.min_backoff,
                Err(err) => {
                    warn!(
                        target = "harness.poll",
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "poll failed; backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.max_backoff);
                }
            }
        }
        info!(target = "harness.poll", client_id = %client_id, "poll loop stopped");
    }
}
