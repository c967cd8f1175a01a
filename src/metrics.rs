/// Metrics and telemetry for Estate Portal
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Gate-pass lifecycle events
/// - Payment outcomes
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Gate Pass Metrics ==========

    /// Gate pass lifecycle events (created, verified, checked_in, ...)
    pub static ref GATE_PASS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gate_pass_events_total",
        "Total number of gate pass lifecycle events",
        &["event"]
    )
    .unwrap();

    // ========== Payment Metrics ==========

    /// Payment transactions reaching a status
    pub static ref PAYMENT_TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "payment_transactions_total",
        "Total number of payment transactions by resulting status",
        &["status"]
    )
    .unwrap();

    /// Provider callbacks by outcome
    pub static ref PAYMENT_CALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "payment_callbacks_total",
        "Total number of payment provider callbacks",
        &["outcome"]
    )
    .unwrap();

    // ========== Account Metrics ==========

    pub static ref SIGNUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "signups_total",
        "Total number of profiles created by role",
        &["role"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a gate pass event
pub fn record_gate_pass_event(event: &str) {
    GATE_PASS_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Record a payment transaction reaching a status
pub fn record_payment_status(status: &str) {
    PAYMENT_TRANSACTIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a provider callback
pub fn record_payment_callback(outcome: &str) {
    PAYMENT_CALLBACKS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a profile creation
pub fn record_signup(role: &str) {
    SIGNUPS_TOTAL.with_label_values(&[role]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/passes", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_domain_events() {
        record_gate_pass_event("checked_in");
        record_payment_status("completed");
        record_payment_callback("unknown_transaction");
        let metrics = render_metrics();
        assert!(metrics.contains("gate_pass_events_total"));
        assert!(metrics.contains("payment_transactions_total"));
        assert!(metrics.contains("payment_callbacks_total"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("session_cleanup", "success", 0.2);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }
}
