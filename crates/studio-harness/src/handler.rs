use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_proto::{Job, JobResult};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// `Err` carries the error payload returned to the bridge (a string or a
/// structured object).
pub type HandlerOutcome = Result<Value, Value>;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, args: Value) -> HandlerOutcome;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    async fn handle(&self, args: Value) -> HandlerOutcome {
        (self)(args).await
    }
}

/// Job handlers keyed by job type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: impl JobHandler + 'static) {
        self.handlers.insert(job_type.into(), Arc::new(handler));
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Runs the job and shapes the outcome for `POST /result`.
    pub async fn dispatch(&self, job: Job) -> JobResult {
        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            warn!(
                target = "harness.dispatch",
                job_id = %job.job_id,
                job_type = %job.job_type,
                "no handler for job type"
            );
            return JobResult::failure(
                job.job_id,
                json!(format!("unknown job type: {}", job.job_type)),
            );
        };
        debug!(
            target = "harness.dispatch",
            job_id = %job.job_id,
            job_type = %job.job_type,
            "dispatching job"
        );
        match handler.handle(job.args).await {
            Ok(result) => JobResult::success(job.job_id, result),
            Err(error) => JobResult::failure(job.job_id, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(job_type: &str, args: Value) -> Job {
        Job {
            job_id: "job_test".into(),
            job_type: job_type.into(),
            args,
            created_at: 0.0,
        }
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", |args: Value| async move { Ok::<_, Value>(args) });
        registry.register("fail", |_args: Value| async move { Err::<Value, _>(json!("boom")) });

        let ok = registry.dispatch(job("echo", json!({ "n": 1 }))).await;
        assert!(ok.ok);
        assert_eq!(ok.result, Some(json!({ "n": 1 })));

        let failed = registry.dispatch(job("fail", Value::Null)).await;
        assert!(!failed.ok);
        assert_eq!(failed.error_message(), "boom");
    }

    #[tokio::test]
    async fn unknown_job_type_is_answered() {
        let registry = HandlerRegistry::new();
        let result = registry.dispatch(job("teleport", Value::Null)).await;
        assert!(!result.ok);
        assert_eq!(result.job_id, "job_test");
        assert_eq!(result.error_message(), "unknown job type: teleport");
    }
}
