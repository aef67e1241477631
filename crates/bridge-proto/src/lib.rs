//! Wire definitions shared by the bridge process and the host harness.
//! Both sides of the long-poll link serialize exactly these shapes, so the
//! crate stays free of runtime dependencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CLIENT_ID: &str = "studio";
pub const DEFAULT_HTTP_PORT: u16 = 28650;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LIVENESS_WINDOW_SECS: u64 = 15;

/// One unit of work handed to the polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub args: Value,
    /// Unix seconds, fractional.
    pub created_at: f64,
}

/// Outcome posted back by the polling client to `POST /result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JobResult {
    pub fn success(job_id: impl Into<String>, result: Value) -> Self {
        Self {
            job_id: job_id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(job_id: impl Into<String>, error: Value) -> Self {
        Self {
            job_id: job_id.into(),
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    /// Human readable failure text. Structured errors keep their detail as
    /// pretty-printed JSON so callers can see expected vs. actual content.
    pub fn error_message(&self) -> String {
        match &self.error {
            None | Some(Value::Null) => "Studio error".to_string(),
            Some(Value::String(text)) if text.is_empty() => "Studio error".to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => {
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            }
        }
    }
}

/// Body of `GET /poll`. `job` is serialized as `null` when the poll idled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub ok: bool,
    pub job: Option<Job>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
    pub server_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Answer to "is this client connected", as reported to tool callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_uses_type_on_the_wire() {
        let job = Job {
            job_id: "job_0123456789ab".into(),
            job_type: "patch_script".into(),
            args: json!({ "path": "Workspace.Script" }),
            created_at: 1.5,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "patch_script");
        assert!(value.get("job_type").is_none());
    }

    #[test]
    fn idle_poll_serializes_null_job() {
        let body = serde_json::to_value(PollResponse { ok: true, job: None }).unwrap();
        assert_eq!(body, json!({ "ok": true, "job": null }));
    }

    #[test]
    fn result_without_ok_is_a_failure() {
        let result: JobResult = serde_json::from_value(json!({ "job_id": "job_1" })).unwrap();
        assert!(!result.ok);
        assert_eq!(result.error_message(), "Studio error");
    }

    #[test]
    fn structured_errors_render_as_json() {
        let result = JobResult::failure(
            "job_2",
            json!({ "code": "content_mismatch", "expected": "b", "actual": "x" }),
        );
        let message = result.error_message();
        assert!(message.contains("content_mismatch"));
        assert!(message.contains("\"actual\": \"x\""));
    }
}
