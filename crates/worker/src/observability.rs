use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const EVENTS_STORED_TOTAL: &str = "capture_worker_events_stored_total";
const EVENTS_OBSERVED_TOTAL: &str = "capture_worker_events_observed_total";
const EVENTS_RECLAIMED_TOTAL: &str = "capture_worker_events_reclaimed_total";
const STORE_DURATION_MS: &str = "capture_worker_store_duration_ms";
const CAPTURE_TO_STORE_LAG_MS: &str = "capture_worker_capture_to_store_lag_ms";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn _render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_event_stored(result: &str, duration_ms: f64) {
    counter!(
        EVENTS_STORED_TOTAL,
        "result" => result.to_string()
    )
    .increment(1);

    histogram!(STORE_DURATION_MS).record(duration_ms.max(0.0));
}

pub fn register_event_observed(lag_ms: i64) {
    counter!(EVENTS_OBSERVED_TOTAL).increment(1);
    histogram!(CAPTURE_TO_STORE_LAG_MS).record(lag_ms.max(0) as f64);
}

pub fn register_event_reclaimed(group: &str) {
    counter!(
        EVENTS_RECLAIMED_TOTAL,
        "group" => group.to_string()
    )
    .increment(1);
}
