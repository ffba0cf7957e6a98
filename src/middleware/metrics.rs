use axum::http::StatusCode;
use axum::{extract::Request, middleware::Next, response::Response as HttpResponse};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::context::RequestContext;
use crate::response::Response;
use crate::router::MatchedRoute;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const DURATION_METRIC: &str = "http_request_duration_seconds";

/// Install the Prometheus recorder. Later calls return the first handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(DURATION_METRIC.to_string()),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )?
        .install_recorder()?;

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_counter!(
        "http_responses_total",
        "Total number of HTTP responses by status"
    );
    describe_counter!("http_errors_total", "Total number of HTTP errors");
    describe_counter!(
        "router_dispatch_total",
        "Route resolution outcomes (matched, fallback, not_found, ...)"
    );
    describe_histogram!(DURATION_METRIC, "HTTP request duration in seconds");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Count one resolve outcome.
pub fn record_dispatch(outcome: &'static str) {
    counter!("router_dispatch_total", "outcome" => outcome).increment(1);
}

/// Collects request metrics, labelled by the matched route template so raw
/// paths never become label values.
pub async fn metrics_middleware(request: Request, next: Next) -> HttpResponse {
    let start = Instant::now();
    let method = request.method().to_string();

    counter!("http_requests_total", "method" => method.clone()).increment(1);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    let status_class = format!("{}xx", status / 100);
    let route = response
        .extensions()
        .get::<MatchedRoute>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unmatched".to_string());

    histogram!(
        DURATION_METRIC,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .record(duration);

    counter!(
        "http_responses_total",
        "method" => method,
        "route" => route,
        "status" => status.to_string(),
        "status_class" => status_class.clone()
    )
    .increment(1);

    if status >= 400 {
        counter!("http_errors_total", "status_class" => status_class).increment(1);
    }

    response
}

/// Router handler rendering the Prometheus exposition.
pub async fn metrics_handler(_ctx: Arc<RequestContext>) -> Response {
    match get_metrics_handle() {
        Some(handle) => Response::text(handle.render()).with_status(StatusCode::OK),
        None => Response::json(json!({"error": "metrics not initialized"}))
            .with_status(StatusCode::SERVICE_UNAVAILABLE),
    }
}
