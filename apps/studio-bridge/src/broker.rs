use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bridge_proto::{Job, JobResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::liveness::{ClientSnapshot, LivenessTracker};
use crate::metrics;
use crate::state::unix_now;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("client {client_id} is not connected")]
    NotConnected { client_id: String },
    #[error("job {job_id} timed out after {waited:?}")]
    Timeout {
        job_id: String,
        waited: Duration,
        claimed: bool,
    },
    #[error("too many pending jobs (limit {limit})")]
    QueueFull { limit: usize },
    #[error("job was abandoned before a result arrived")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub job_timeout: Duration,
    pub max_pending_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerStats {
    /// Enqueued and not yet handed to a poller.
    pub queued: usize,
    /// Handed to a poller, result outstanding.
    pub in_flight: usize,
    pub clients: Vec<ClientSnapshot>,
}

/// Correlates tool calls with results posted by a polling client.
///
/// Every submitted job owns one slot holding the sender half of a oneshot
/// channel. Exactly one of three things consumes the slot: a matching
/// `POST /result`, the submitter's timeout, or the submitter being dropped.
/// Whoever removes the slot under the lock owns the outcome, so a result
/// racing a timeout is delivered at most once.
pub struct JobBroker {
    table: Mutex<JobTable>,
    signals: DashMap<String, Arc<Notify>>,
    liveness: Arc<LivenessTracker>,
    settings: BrokerSettings,
}

#[derive(Default)]
struct JobTable {
    queues: HashMap<String, VecDeque<Job>>,
    slots: HashMap<String, Slot>,
}

struct Slot {
    client_id: String,
    claimed: bool,
    sender: oneshot::Sender<JobResult>,
    enqueued: Instant,
}

impl JobTable {
    fn unique_job_id(&self) -> String {
        loop {
            let id = new_job_id();
            if !self.slots.contains_key(&id) {
                return id;
            }
        }
    }

    fn pop_for(&mut self, client_id: &str) -> Option<Job> {
        let queue = self.queues.get_mut(client_id)?;
        let mut claimed = None;
        while let Some(job) = queue.pop_front() {
            if let Some(slot) = self.slots.get_mut(&job.job_id) {
                slot.claimed = true;
                claimed = Some(job);
                break;
            }
        }
        if queue.is_empty() {
            self.queues.remove(client_id);
        }
        claimed
    }

    /// Removes the slot and, if nobody claimed it yet, the queued job.
    fn take_slot(&mut self, job_id: &str) -> Option<Slot> {
        let slot = self.slots.remove(job_id)?;
        if !slot.claimed {
            if let Some(queue) = self.queues.get_mut(&slot.client_id) {
                queue.retain(|job| job.job_id != job_id);
                if queue.is_empty() {
                    self.queues.remove(&slot.client_id);
                }
            }
        }
        metrics::PENDING_JOBS.set(self.slots.len() as i64);
        Some(slot)
    }
}

/// `job_` followed by twelve hex digits.
pub fn new_job_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("job_{}", &hex[..12])
}

/// Releases the job's slot if its submitter goes away without an outcome.
struct SlotGuard<'a> {
    broker: &'a JobBroker,
    job_id: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.broker.table.lock().take_slot(&self.job_id).is_some() {
            metrics::JOB_OUTCOMES.with_label_values(&["cancelled"]).inc();
            debug!(job_id = %self.job_id, "submitter dropped; job released");
        }
    }
}

/// A poller's share of its client's wake-up signal. The map entry goes
/// away with the last lease, so idle client ids leave nothing behind.
struct SignalLease<'a> {
    broker: &'a JobBroker,
    client_id: &'a str,
    signal: Option<Arc<Notify>>,
}

impl Drop for SignalLease<'_> {
    fn drop(&mut self) {
        // Release ours first so the last lease sees a count of one.
        self.signal.take();
        self.broker
            .signals
            .remove_if(self.client_id, |_, signal| Arc::strong_count(signal) == 1);
    }
}

impl JobBroker {
    pub fn new(liveness: Arc<LivenessTracker>, settings: BrokerSettings) -> Self {
        Self {
            table: Mutex::new(JobTable::default()),
            signals: DashMap::new(),
            liveness,
            settings,
        }
    }

    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        &self.liveness
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Wake-up signal for a poller of `client_id`, created on first use.
    fn lease_signal<'a>(&'a self, client_id: &'a str) -> SignalLease<'a> {
        let signal = match self.signals.get(client_id) {
            Some(signal) => Arc::clone(signal.value()),
            None => Arc::clone(
                self.signals
                    .entry(client_id.to_string())
                    .or_insert_with(|| Arc::new(Notify::new()))
                    .value(),
            ),
        };
        SignalLease {
            broker: self,
            client_id,
            signal: Some(signal),
        }
    }

    /// Clients with a poll currently held open.
    pub fn waiting_clients(&self) -> usize {
        self.signals.len()
    }

    /// Enqueues a job for `client_id` and waits for its result.
    ///
    /// Fails fast with `NotConnected` when the client has not polled within
    /// the liveness window. Dropping the returned future releases the job.
    pub async fn submit(
        &self,
        job_type: &str,
        args: Value,
        client_id: &str,
    ) -> Result<JobResult, BrokerError> {
        if !self.liveness.is_connected(client_id) {
            metrics::JOB_OUTCOMES
                .with_label_values(&["not_connected"])
                .inc();
            return Err(BrokerError::NotConnected {
                client_id: client_id.to_string(),
            });
        }

        let (sender, mut receiver) = oneshot::channel();
        let job_id = {
            let mut table = self.table.lock();
            if table.slots.len() >= self.settings.max_pending_jobs {
                metrics::JOB_OUTCOMES.with_label_values(&["queue_full"]).inc();
                return Err(BrokerError::QueueFull {
                    limit: self.settings.max_pending_jobs,
                });
            }
            let job_id = table.unique_job_id();
            let job = Job {
                job_id: job_id.clone(),
                job_type: job_type.to_string(),
                args,
                created_at: unix_now(),
            };
            table
                .queues
                .entry(client_id.to_string())
                .or_default()
                .push_back(job);
            table.slots.insert(
                job_id.clone(),
                Slot {
                    client_id: client_id.to_string(),
                    claimed: false,
                    sender,
                    enqueued: Instant::now(),
                },
            );
            metrics::PENDING_JOBS.set(table.slots.len() as i64);
            job_id
        };
        metrics::JOBS_SUBMITTED.with_label_values(&[job_type]).inc();
        debug!(job_id = %job_id, job_type, client_id, "job enqueued");
        // With no entry there is no held poll; the next one sees the queue.
        if let Some(signal) = self.signals.get(client_id) {
            signal.notify_waiters();
        }

        let guard = SlotGuard {
            broker: self,
            job_id,
        };
        let waited = self.settings.job_timeout;
        match tokio::time::timeout(waited, &mut receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(BrokerError::Closed),
            Err(_) => {
                let released = self.table.lock().take_slot(&guard.job_id);
                match released {
                    Some(slot) => {
                        metrics::JOB_OUTCOMES.with_label_values(&["timeout"]).inc();
                        warn!(
                            job_id = %guard.job_id,
                            job_type,
                            claimed = slot.claimed,
                            "job timed out waiting for a result"
                        );
                        Err(BrokerError::Timeout {
                            job_id: guard.job_id.clone(),
                            waited,
                            claimed: slot.claimed,
                        })
                    }
                    // The result won the race after the deadline fired.
                    None => receiver.try_recv().map_err(|_| BrokerError::Closed),
                }
            }
        }
    }

    /// Hands the oldest queued job for `client_id` to the caller, holding
    /// the request open up to `hold` while the queue is empty.
    pub async fn poll(&self, client_id: &str, hold: Duration) -> Option<Job> {
        self.liveness.touch(client_id);
        let lease = self.lease_signal(client_id);
        let signal = lease.signal.as_deref()?;
        let deadline = Instant::now() + hold;
        loop {
            let notified = signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let claimed = self.table.lock().pop_for(client_id);
            if let Some(job) = claimed {
                metrics::POLLS.with_label_values(&["job"]).inc();
                debug!(job_id = %job.job_id, client_id, "job claimed");
                return Some(job);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let job = self.table.lock().pop_for(client_id);
                let outcome = if job.is_some() { "job" } else { "idle" };
                metrics::POLLS.with_label_values(&[outcome]).inc();
                return job;
            }
        }
    }

    /// Routes a posted result to its waiting submitter. Returns `false` for
    /// unknown, expired or already answered job ids; those are dropped.
    pub fn submit_result(&self, result: JobResult) -> bool {
        let slot = self.table.lock().take_slot(&result.job_id);
        let Some(slot) = slot else {
            metrics::LATE_RESULTS.inc();
            info!(job_id = %result.job_id, "ignoring result for unknown or expired job");
            return false;
        };
        metrics::JOB_LATENCY.observe(slot.enqueued.elapsed().as_secs_f64());
        let outcome = if result.ok { "ok" } else { "error" };
        let job_id = result.job_id.clone();
        if slot.sender.send(result).is_err() {
            metrics::LATE_RESULTS.inc();
            debug!(job_id = %job_id, "submitter went away before the result arrived");
            return false;
        }
        metrics::JOB_OUTCOMES.with_label_values(&[outcome]).inc();
        true
    }

    pub fn pending_jobs(&self) -> usize {
        self.table.lock().slots.len()
    }

    pub fn stats(&self) -> BrokerStats {
        let (queued, in_flight) = {
            let table = self.table.lock();
            let in_flight = table.slots.values().filter(|slot| slot.claimed).count();
            (table.slots.len() - in_flight, in_flight)
        };
        BrokerStats {
            queued,
            in_flight,
            clients: self.liveness.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn broker(job_timeout: Duration, max_pending_jobs: usize) -> Arc<JobBroker> {
        let liveness = Arc::new(LivenessTracker::new(Duration::from_secs(15)));
        Arc::new(JobBroker::new(
            liveness,
            BrokerSettings {
                job_timeout,
                max_pending_jobs,
            },
        ))
    }

    async fn wait_for_pending(broker: &JobBroker, count: usize) {
        while broker.pending_jobs() < count {
            tokio::task::yield_now().await;
        }
    }

    #[test_timeout::timeout]
    fn job_ids_are_unique_and_well_formed() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_job_id()).collect();
        assert_eq!(ids.len(), 10_000);
        for id in ids.iter().take(50) {
            let hex = id.strip_prefix("job_").unwrap();
            assert_eq!(hex.len(), 12);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_client_fails_fast() {
        let broker = broker(Duration::from_secs(30), 8);
        let started = Instant::now();
        let err = broker
            .submit("get_children", json!({}), "studio")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotConnected { .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(broker.pending_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_poll_returns_none_after_hold() {
        let broker = broker(Duration::from_secs(30), 8);
        let started = Instant::now();
        assert!(broker.poll("studio", Duration::from_secs(5)).await.is_none());
        let held = started.elapsed();
        assert!(held >= Duration::from_secs(5) && held < Duration::from_millis(5_100));
        assert!(broker.liveness().is_connected("studio"));
    }

    #[tokio::test(start_paused = true)]
    async fn result_is_delivered_to_its_submitter() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("studio");

        let submitter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .submit("read_script", json!({ "path": "Workspace.S" }), "studio")
                    .await
            })
        };
        let job = broker
            .poll("studio", Duration::from_secs(5))
            .await
            .expect("job delivered");
        assert_eq!(job.job_type, "read_script");
        assert_eq!(job.args["path"], "Workspace.S");

        assert!(broker.submit_result(JobResult::success(&job.job_id, json!({ "source": "x" }))));
        let result = submitter.await.unwrap().unwrap();
        assert!(result.ok);
        assert_eq!(result.result, Some(json!({ "source": "x" })));
        assert_eq!(broker.pending_jobs(), 0);

        // A duplicate post for the same id is ignored.
        assert!(!broker.submit_result(JobResult::success(&job.job_id, json!(null))));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_wakes_when_a_job_arrives() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("studio");

        let poller = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.poll("studio", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        let submitter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.submit("undo", json!({}), "studio").await })
        };
        let job = poller.await.unwrap().expect("woken with a job");
        assert_eq!(job.job_type, "undo");
        broker.submit_result(JobResult::success(&job.job_id, json!(true)));
        assert!(submitter.await.unwrap().unwrap().ok);
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_are_delivered_in_submission_order() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("studio");
        let mut submitters = Vec::new();
        for n in 0..3 {
            let submitter = Arc::clone(&broker);
            submitters.push(tokio::spawn(async move {
                submitter.submit("run_code", json!({ "n": n }), "studio").await
            }));
            wait_for_pending(&broker, n + 1).await;
        }
        for n in 0..3 {
            let job = broker.poll("studio", Duration::from_secs(1)).await.unwrap();
            assert_eq!(job.args["n"], n);
            broker.submit_result(JobResult::success(&job.job_id, json!(n)));
        }
        for (n, submitter) in submitters.into_iter().enumerate() {
            assert_eq!(submitter.await.unwrap().unwrap().result, Some(json!(n)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queues_are_per_client() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("a");
        let submitter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.submit("undo", json!({}), "a").await })
        };
        wait_for_pending(&broker, 1).await;
        assert!(broker.poll("b", Duration::from_secs(1)).await.is_none());
        let job = broker.poll("a", Duration::from_secs(1)).await.unwrap();
        broker.submit_result(JobResult::success(&job.job_id, json!(null)));
        submitter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unclaimed_job_is_withdrawn_on_timeout() {
        let broker = broker(Duration::from_secs(2), 8);
        broker.liveness().touch("studio");
        let err = broker
            .submit("get_selection", json!({}), "studio")
            .await
            .unwrap_err();
        match err {
            BrokerError::Timeout {
                waited, claimed, ..
            } => {
                assert_eq!(waited, Duration::from_secs(2));
                assert!(!claimed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(broker.pending_jobs(), 0);
        assert!(broker.poll("studio", Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_timeout_is_ignored() {
        let broker = broker(Duration::from_secs(2), 8);
        broker.liveness().touch("studio");
        let submitter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.submit("get_selection", json!({}), "studio").await })
        };
        let job = broker.poll("studio", Duration::from_secs(1)).await.unwrap();
        let err = submitter.await.unwrap().unwrap_err();
        assert!(matches!(err, BrokerError::Timeout { claimed: true, .. }));
        assert!(!broker.submit_result(JobResult::success(&job.job_id, json!([]))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_submitter_releases_its_job() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("studio");
        let submitter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.submit("undo", json!({}), "studio").await })
        };
        wait_for_pending(&broker, 1).await;
        submitter.abort();
        let _ = submitter.await;
        assert_eq!(broker.pending_jobs(), 0);
        assert!(broker.poll("studio", Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_limit_is_enforced() {
        let broker = broker(Duration::from_secs(30), 1);
        broker.liveness().touch("studio");
        let first = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.submit("undo", json!({}), "studio").await })
        };
        wait_for_pending(&broker, 1).await;
        let err = broker.submit("redo", json!({}), "studio").await.unwrap_err();
        assert!(matches!(err, BrokerError::QueueFull { limit: 1 }));

        let job = broker.poll("studio", Duration::from_secs(1)).await.unwrap();
        assert_eq!(job.job_type, "undo");
        broker.submit_result(JobResult::failure(&job.job_id, json!("nothing to undo")));
        let result = first.await.unwrap().unwrap();
        assert_eq!(result.error_message(), "nothing to undo");
    }

    #[tokio::test(start_paused = true)]
    async fn wake_signals_do_not_outlive_their_polls() {
        let broker = broker(Duration::from_secs(30), 8);
        for n in 0..1000 {
            assert!(broker.poll(&format!("client-{n}"), Duration::ZERO).await.is_none());
        }
        assert_eq!(broker.waiting_clients(), 0);

        let pollers: Vec<_> = (0..2)
            .map(|_| {
                let poller = Arc::clone(&broker);
                tokio::spawn(async move { poller.poll("studio", Duration::from_secs(5)).await })
            })
            .collect();
        while broker.waiting_clients() == 0 {
            tokio::task::yield_now().await;
        }
        let submitter = {
            let submitter = Arc::clone(&broker);
            tokio::spawn(async move { submitter.submit("undo", json!({}), "studio").await })
        };
        wait_for_pending(&broker, 1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        // One poller took the job; the other still holds the signal.
        assert_eq!(broker.waiting_clients(), 1);

        let mut delivered = Vec::new();
        for poller in pollers {
            if let Some(job) = poller.await.unwrap() {
                delivered.push(job);
            }
        }
        assert_eq!(delivered.len(), 1);
        assert_eq!(broker.waiting_clients(), 0);
        broker.submit_result(JobResult::success(&delivered[0].job_id, json!(null)));
        submitter.await.unwrap().unwrap();

        let abandoned = {
            let poller = Arc::clone(&broker);
            tokio::spawn(async move { poller.poll("studio", Duration::from_secs(5)).await })
        };
        while broker.waiting_clients() == 0 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        let _ = abandoned.await;
        assert_eq!(broker.waiting_clients(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_split_queued_and_in_flight() {
        let broker = broker(Duration::from_secs(30), 8);
        broker.liveness().touch("studio");
        let mut submitters = Vec::new();
        for _ in 0..2 {
            let broker = Arc::clone(&broker);
            submitters.push(tokio::spawn(async move {
                broker.submit("undo", json!({}), "studio").await
            }));
        }
        wait_for_pending(&broker, 2).await;
        let job = broker.poll("studio", Duration::from_secs(1)).await.unwrap();
        let stats = broker.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.clients.len(), 1);
        broker.submit_result(JobResult::success(&job.job_id, json!(null)));
        for submitter in submitters {
            submitter.abort();
        }
    }
}
