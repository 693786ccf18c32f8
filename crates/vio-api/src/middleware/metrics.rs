//! # Request Metrics
//!
//! HTTP-level metrics recorded through the `metrics` facade:
//!
//! - `http_requests_total{method, path, status}`
//! - `http_request_errors_total{method, path, status}` (4xx and 5xx)
//! - `http_request_duration_seconds{method, path, status}`
//!
//! Domain counters (`violations_created_total`, `appeals_created_total`,
//! `appeal_transitions_total`) are recorded by the services. Nothing is
//! collected until a recorder is installed; the binary installs the
//! Prometheus recorder and `/metrics` renders it.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Replace UUID segments with `{id}` to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn record_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
    if status >= 400 {
        metrics::counter!("http_request_errors_total", &labels).increment(1);
    }
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    record_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_replaces_uuids() {
        let path = "/api/v1/appeals/550e8400-e29b-41d4-a716-446655440000/actions";
        assert_eq!(normalize_path(path), "/api/v1/appeals/{id}/actions");
    }

    #[test]
    fn normalize_path_preserves_named_segments() {
        assert_eq!(normalize_path("/api/v1/violations"), "/api/v1/violations");
    }

    #[test]
    fn recorded_requests_render_as_prometheus_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_request("GET", "/api/v1/violations", 200, 0.01);
            record_request("POST", "/api/v1/appeals/{id}/actions", 409, 0.02);
        });

        let output = handle.render();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("http_request_errors_total"));
        assert!(output.contains("status=\"409\""));
    }
}
