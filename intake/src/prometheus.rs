// prometheus exporter setup

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::api::Action;

pub const SUBMISSIONS_RECEIVED_TOTAL: &str = "intake_submissions_received_total";
pub const SUBMISSIONS_DROPPED_TOTAL: &str = "intake_submissions_dropped_total";
pub const ROWS_WRITTEN_TOTAL: &str = "intake_rows_written_total";
pub const SLIP_BYTES: &str = "intake_slip_bytes";
pub const RATE_LIMITER_FAIL_OPEN_TOTAL: &str = "intake_rate_limiter_fail_open_total";
pub const CLIENT_LIMITER_KEY_COUNT: &str = "intake_client_limiter_key_count";

pub fn report_received_submission(action: Action) {
    counter!(SUBMISSIONS_RECEIVED_TOTAL, "action" => action.as_str()).increment(1);
}

pub fn report_dropped_submission(cause: &'static str) {
    counter!(SUBMISSIONS_DROPPED_TOTAL, "cause" => cause).increment(1);
}

/// `op` is either `append` or `overwrite`.
pub fn report_row_written(sheet: &str, op: &'static str) {
    counter!(ROWS_WRITTEN_TOTAL, "sheet" => sheet.to_owned(), "op" => op).increment(1);
}

pub fn report_slip_size(bytes: usize) {
    histogram!(SLIP_BYTES).record(bytes as f64);
}

pub fn report_rate_limiter_fail_open(action: Action) {
    counter!(RATE_LIMITER_FAIL_OPEN_TOTAL, "action" => action.as_str()).increment(1);
}

pub fn report_client_limiter_keys(count: usize) {
    gauge!(CLIENT_LIMITER_KEY_COUNT).set(count as f64);
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

pub fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
    const SLIP_SIZES: &[f64] = &[
        10240.0,   // 10KB
        102400.0,  // 100KB
        512000.0,  // 500KB
        1048576.0, // 1MB
        2097152.0, // 2MB
        5242880.0, // 5MB, largest accepted slip
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .set_buckets_for_metric(Matcher::Full(SLIP_BYTES.to_string()), SLIP_SIZES)?
        .install_recorder()?;

    Ok(handle)
}
