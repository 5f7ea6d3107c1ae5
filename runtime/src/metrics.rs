//! Prometheus metrics for the stock engine.
//!
//! Every component records through the `metrics` facade; nothing is
//! exported until a [`MetricsServer`] installs the Prometheus recorder.
//!
//! - Stock counter changes and compensations
//! - Draw outcomes, latency and rollback failures
//! - Admission outcomes and wait time
//! - Persist sweeps
//!
//! # Example
//!
//! ```rust,no_run
//! use stockgate_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Metric names.
pub mod names {
    /// Counter changes, labelled `outcome = applied | rejected`
    pub const STOCK_INCR_TOTAL: &str = "stock_incr_total";
    /// Compensating increments issued for rejected batches and reservations
    pub const STOCK_COMPENSATIONS_TOTAL: &str = "stock_compensations_total";
    /// Draw sessions, labelled `outcome = won | out_of_stock | error`
    pub const DRAW_TOTAL: &str = "draw_total";
    /// Draw rollbacks that could not restore a deduction
    pub const DRAW_ROLLBACK_FAILURES_TOTAL: &str = "draw_rollback_failures_total";
    /// Draw session latency
    pub const DRAW_DURATION: &str = "draw_duration_seconds";
    /// Admission attempts, labelled `outcome = admitted | busy`
    pub const ADMISSION_TOTAL: &str = "admission_total";
    /// Time spent inside `acquire`
    pub const ADMISSION_WAIT_DURATION: &str = "admission_wait_duration_seconds";
    /// Items written to the durable store by sweeps
    pub const PERSIST_FLUSHED_TOTAL: &str = "persist_flushed_total";
    /// Persist sweep latency
    pub const PERSIST_SWEEP_DURATION: &str = "persist_sweep_duration_seconds";
}

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder and spawn the HTTP listener.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built or the
    /// listener cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs
    /// a warning, leaves [`handle`](Self::handle) empty and returns `Ok`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            // Latency buckets, seconds
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }
        register_metrics();

        // `ExporterError` carries no Debug/Display to log
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );

        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Stock cache
    describe_counter!(
        names::STOCK_INCR_TOTAL,
        "Total number of stock counter changes by outcome"
    );
    describe_counter!(
        names::STOCK_COMPENSATIONS_TOTAL,
        "Total number of compensating increments issued"
    );
    describe_counter!(
        names::PERSIST_FLUSHED_TOTAL,
        "Total number of stock rows written back to the durable store"
    );
    describe_histogram!(
        names::PERSIST_SWEEP_DURATION,
        "Time taken by one persist sweep"
    );

    // Draws
    describe_counter!(names::DRAW_TOTAL, "Total number of draw sessions by outcome");
    describe_counter!(
        names::DRAW_ROLLBACK_FAILURES_TOTAL,
        "Total number of deductions a failed draw could not restore"
    );
    describe_histogram!(names::DRAW_DURATION, "Time taken by one draw session");

    // Admission
    describe_counter!(
        names::ADMISSION_TOTAL,
        "Total number of admission attempts by outcome"
    );
    describe_histogram!(
        names::ADMISSION_WAIT_DURATION,
        "Time spent waiting for an admission slot"
    );
}

/// Draw metrics recorder.
pub struct DrawMetrics;

impl DrawMetrics {
    /// Record a finished draw session.
    pub fn record(outcome: &'static str, duration: Duration) {
        counter!(names::DRAW_TOTAL, "outcome" => outcome).increment(1);
        histogram!(names::DRAW_DURATION).record(duration.as_secs_f64());
    }

    /// Record deductions that rollback failed to restore.
    pub fn record_rollback_failures(count: usize) {
        counter!(names::DRAW_ROLLBACK_FAILURES_TOTAL).increment(count as u64);
    }
}

/// Admission metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record an acquire attempt and how long it waited.
    pub fn record(admitted: bool, waited: Duration) {
        let outcome = if admitted { "admitted" } else { "busy" };
        counter!(names::ADMISSION_TOTAL, "outcome" => outcome).increment(1);
        histogram!(names::ADMISSION_WAIT_DURATION).record(waited.as_secs_f64());
    }
}
