//! Prometheus metrics for access-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const AUTHORIZATION_DECISIONS_TOTAL: &str = "authorization_decisions_total";
pub const VERIFICATION_EVENTS_TOTAL: &str = "verification_events_total";

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE.set(handle).map_err(|_| {
        AppError::InternalError(anyhow::anyhow!("Metrics handle already initialized"))
    })?;

    metrics::describe_counter!(
        AUTHORIZATION_DECISIONS_TOTAL,
        "Authorization gate decisions by outcome"
    );
    metrics::describe_counter!(
        VERIFICATION_EVENTS_TOTAL,
        "Verification flow events by kind"
    );

    Ok(())
}

/// Metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_authorization(outcome: &'static str) {
    metrics::counter!(AUTHORIZATION_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_verification_event(event: &'static str) {
    metrics::counter!(VERIFICATION_EVENTS_TOTAL, "event" => event).increment(1);
}
