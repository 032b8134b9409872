//! Metrics module
//!
//! Prometheus counters for token issuance, verification and requirement
//! resolution.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref TOKENS_ISSUED: CounterVec = register_counter_vec!(
        "jwt_tokens_issued_total",
        "Tokens issued",
        &["token_type"]
    ).unwrap();

    pub static ref VERIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "jwt_verifications_total",
        "Token verifications by outcome",
        &["token_type", "outcome"]  // "ok" or an error code
    ).unwrap();

    pub static ref VERIFICATION_DURATION: HistogramVec = register_histogram_vec!(
        "jwt_verification_duration_seconds",
        "Token verification duration in seconds",
        &["token_type"],
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]
    ).unwrap();

    pub static ref REQUIREMENT_REJECTIONS: CounterVec = register_counter_vec!(
        "jwt_requirement_rejections_total",
        "Requests rejected while resolving token requirements",
        &["reason"]
    ).unwrap();
}

/// Record an issued token
pub fn record_token_issued(token_type: &str) {
    TOKENS_ISSUED.with_label_values(&[token_type]).inc();
}

/// Record a verification outcome and how long it took
pub fn record_verification(token_type: &str, outcome: &str, duration_secs: f64) {
    VERIFICATIONS_TOTAL
        .with_label_values(&[token_type, outcome])
        .inc();
    VERIFICATION_DURATION
        .with_label_values(&[token_type])
        .observe(duration_secs);
}

/// Record a rejected request
pub fn record_requirement_rejection(reason: &str) {
    REQUIREMENT_REJECTIONS.with_label_values(&[reason]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn encode_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
