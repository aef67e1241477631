use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("studio_bridge_jobs_submitted_total", "jobs enqueued by job type"),
        &["job_type"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "studio_bridge_job_outcomes_total",
            "submitted jobs by how they finished",
        ),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("studio_bridge_polls_total", "long-polls by outcome"),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static LATE_RESULTS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "studio_bridge_late_results_total",
        "results posted for jobs that were no longer pending",
    ))
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PENDING_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new(
        "studio_bridge_pending_jobs",
        "jobs waiting for a result",
    ))
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static JOB_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(
        HistogramOpts::new(
            "studio_bridge_job_latency_seconds",
            "time from enqueue to result for answered jobs",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn gather() -> Vec<u8> {
    // Series register lazily; force them so a fresh process still reports zeros.
    Lazy::force(&JOBS_SUBMITTED);
    Lazy::force(&JOB_OUTCOMES);
    Lazy::force(&POLLS);
    Lazy::force(&LATE_RESULTS);
    Lazy::force(&PENDING_JOBS);
    Lazy::force(&JOB_LATENCY);
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "metrics encode error");
    }
    buffer
}
