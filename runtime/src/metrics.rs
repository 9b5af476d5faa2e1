//! Prometheus metrics for the ticket flow.
//!
//! Metrics are emitted through the `metrics` facade; nothing is recorded
//! until a recorder is installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_flow_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... run transactions ...
//! println!("{}", recorder.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Describe the ticket flow metrics and install a Prometheus recorder.
    ///
    /// If another recorder is already installed the existing one is kept
    /// and [`MetricsRecorder::render`] returns `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = match builder.install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                let message = e.to_string();
                if !message.contains("already initialized") {
                    return Err(MetricsError::Install(message));
                }
                tracing::warn!("Metrics recorder already initialized, keeping the existing one");
                None
            },
        };

        describe_metrics();
        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every ticket flow metric.
pub fn describe_metrics() {
    describe_counter!(
        "ticket_flow_transactions_started_total",
        "Transactions started, labelled by requested action"
    );
    describe_counter!(
        "ticket_flow_transaction_outcomes_total",
        "Transactions settled, labelled by outcome"
    );
    describe_counter!(
        "ticket_flow_cleanup_release_failures_total",
        "Release calls that failed while cleaning up a hold"
    );
    describe_counter!(
        "ticket_flow_commands_rejected_total",
        "Triggers rejected because a transaction was already active"
    );
    describe_histogram!(
        "ticket_flow_purchase_duration_seconds",
        "Time from issuing the purchase call until the race settles"
    );
}
