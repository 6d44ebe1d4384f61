use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all content-autopilot metrics
const PREFIX: &str = "content_autopilot";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref PIPELINE_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_pipeline_runs_total"), "Pipeline executions by outcome"),
        &["pipeline", "status", "trigger"]
    ).expect("Failed to create pipeline_runs_total metric");

    pub static ref PIPELINE_ITEMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_pipeline_items_total"), "Work items processed by outcome"),
        &["pipeline", "outcome"]
    ).expect("Failed to create pipeline_items_total metric");

    pub static ref PIPELINE_RUNNING: IntGaugeVec = IntGaugeVec::new(
        Opts::new(format!("{PREFIX}_pipeline_running"), "Whether a pipeline is currently running"),
        &["pipeline"]
    ).expect("Failed to create pipeline_running metric");

    pub static ref PIPELINE_RUN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_pipeline_run_duration_seconds"),
            "Pipeline execution duration in seconds"
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["pipeline"]
    ).expect("Failed to create pipeline_run_duration_seconds metric");

    pub static ref SCHEDULER_NEXT_RUN_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new(
            format!("{PREFIX}_scheduler_next_run_seconds"),
            "Seconds until the scheduler's next tick for a pipeline"
        ),
        &["pipeline"]
    ).expect("Failed to create scheduler_next_run_seconds metric");
}

/// Registers all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    // Re-registration errors are expected in tests
    let _ = REGISTRY.register(Box::new(PIPELINE_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PIPELINE_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PIPELINE_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(PIPELINE_RUN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULER_NEXT_RUN_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_pipeline_run(pipeline: &str, status: &str, trigger: &str, duration: Duration) {
    PIPELINE_RUNS_TOTAL
        .with_label_values(&[pipeline, status, trigger])
        .inc();
    PIPELINE_RUN_DURATION_SECONDS
        .with_label_values(&[pipeline])
        .observe(duration.as_secs_f64());
}

/// `outcome` is one of "added", "skipped" or "error".
pub fn record_pipeline_item(pipeline: &str, outcome: &str) {
    PIPELINE_ITEMS_TOTAL
        .with_label_values(&[pipeline, outcome])
        .inc();
}

pub fn set_pipeline_running(pipeline: &str, running: bool) {
    PIPELINE_RUNNING
        .with_label_values(&[pipeline])
        .set(running as i64);
}

pub fn set_next_tick_in(pipeline: &str, wait: Duration) {
    SCHEDULER_NEXT_RUN_SECONDS
        .with_label_values(&[pipeline])
        .set(wait.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}
