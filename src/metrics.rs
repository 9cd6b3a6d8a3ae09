use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

/// Proxied requests by backend service and outcome
/// (`forwarded`, `rejected`, `connection_failed`, `timeout`, `error`)
pub static PROXY_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_proxy_requests_total",
        "Total number of requests proxied to backend services",
        &["service", "outcome"]
    )
    .unwrap()
});

pub static PROXY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gateway_proxy_request_duration_seconds",
        "Time spent waiting on backend services",
        &["service"]
    )
    .unwrap()
});

pub static AUTH_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_auth_rejections_total",
        "Requests rejected because a valid access token was required",
        &["service"]
    )
    .unwrap()
});

pub static LOGINS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_logins_total",
        "Login attempts by result",
        &["result"]
    )
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
