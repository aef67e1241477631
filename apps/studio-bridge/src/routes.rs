use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bridge_proto::{Ack, ErrorBody, HealthResponse, JobResult, PingResponse, PollResponse};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, Level};

use crate::broker::BrokerStats;
use crate::metrics;
use crate::state::{unix_now, AppState};

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    InvalidJson(String),
    MissingJobId,
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::InvalidJson(reason) => (StatusCode::BAD_REQUEST, "invalid_json", Some(reason)),
            ApiError::MissingJobId => (StatusCode::BAD_REQUEST, "missing_job_id", None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found", None),
        };
        (
            status,
            Json(ErrorBody {
                ok: false,
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientQuery {
    client_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/poll", get(poll))
        .route("/result", post(post_result))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

async fn ping(State(state): State<AppState>, Query(query): Query<ClientQuery>) -> Json<PingResponse> {
    let client_id = state.client_id_or_default(query.client_id.as_deref());
    state.liveness().touch(client_id);
    Json(PingResponse {
        ok: true,
        server_time: unix_now(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime: state.uptime_secs(),
    })
}

async fn poll(State(state): State<AppState>, Query(query): Query<ClientQuery>) -> Json<PollResponse> {
    let client_id = state.client_id_or_default(query.client_id.as_deref());
    let job = state.broker().poll(client_id, state.poll_timeout()).await;
    Json(PollResponse { ok: true, job })
}

/// Parsed by hand so malformed bodies get the documented error codes rather
/// than the extractor's rejection.
async fn post_result(State(state): State<AppState>, body: Bytes) -> ApiResult<Ack> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body).map_err(|err| ApiError::InvalidJson(err.to_string()))?
    };
    let job_id = payload
        .get("job_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::MissingJobId)?;
    let result = JobResult {
        job_id: job_id.to_string(),
        ok: payload.get("ok").and_then(Value::as_bool).unwrap_or(false),
        result: payload.get("result").cloned(),
        error: payload.get("error").cloned(),
    };
    if !state.broker().submit_result(result) {
        debug!(job_id, "result acknowledged but not delivered");
    }
    Ok(Json(Ack::ok()))
}

async fn stats(State(state): State<AppState>) -> Json<BrokerStats> {
    Json(state.broker().stats())
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
