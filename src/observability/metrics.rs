//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mani_batches_total` (counter): batches by envelope format and outcome
//! - `mani_batch_duration_seconds` (histogram): time from arrival to close
//! - `mani_active_batches` (gauge): batches currently holding a slot
//! - `mani_subrequests_total` (counter): sub-requests by outcome
//! - `mani_subrequest_duration_seconds` (histogram): outbound call latency
//!
//! Recording is a no-op until a recorder is installed, so handlers call these
//! unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished (or rejected) batch.
pub fn record_batch(format: &'static str, outcome: &'static str, started: Instant) {
    metrics::counter!("mani_batches_total", "format" => format, "outcome" => outcome).increment(1);
    metrics::histogram!("mani_batch_duration_seconds", "format" => format)
        .record(started.elapsed().as_secs_f64());
}

/// Record one dispatched sub-request.
pub fn record_subrequest(outcome: &'static str, started: Instant) {
    metrics::counter!("mani_subrequests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("mani_subrequest_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

/// Record a sub-request that could not be read from the envelope.
pub fn record_read_error() {
    metrics::counter!("mani_subrequests_total", "outcome" => "read_error").increment(1);
}

pub fn batch_started() {
    metrics::gauge!("mani_active_batches").increment(1.0);
}

pub fn batch_finished() {
    metrics::gauge!("mani_active_batches").decrement(1.0);
}
