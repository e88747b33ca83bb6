//! Ambient process metrics: HTTP request counters/histograms exposed via
//! the `prometheus` crate's global registry.
//!
//! These are distinct from the per-tenant `Metric` rows `aggregation.rs`
//! renders from the store — this module only tracks the dispatcher
//! process itself (request volume, latency), not BBB-protocol domain
//! events.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};

lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "b3lb_http_requests_total",
        "Total number of HTTP requests handled by the dispatcher",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "b3lb_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();
}

/// Axum middleware recording request count and latency for every route.
pub async fn track_metrics(req: Request, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL.with_label_values(&[&method, &path, &status]).inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// `GET /metrics` — process-wide exposition, separate from the per-secret
/// `/bigbluebutton/api/getMeetings`-adjacent text a tenant sees.
pub async fn process_metrics() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_metrics_includes_registered_family() {
        HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "/test", "200"]).inc();
        let text = process_metrics().await.unwrap();
        assert!(text.contains("b3lb_http_requests_total"));
    }
}
