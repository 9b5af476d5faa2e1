//! Error-toast forwarding to an analytics sink.
//!
//! The forwarder observes a [`ToastChannel`] and reports the title of every
//! error toast. Success and warning toasts are never forwarded.

use crate::notifications::ToastChannel;
use std::sync::Arc;
use ticket_flow_core::toast::ToastOptions;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Destination for error reports.
pub trait AnalyticsSink: Send + Sync {
    /// Record an error shown to the user.
    fn log_error_toast(&self, title: &str);
}

/// Analytics sink that records error toasts as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn log_error_toast(&self, title: &str) {
        tracing::error!(target: "analytics", title, "Error toast shown");
    }
}

/// Forward `toast` to `sink` if it is an error toast.
///
/// Returns `true` when the toast was forwarded.
pub fn forward_error_toast(toast: &ToastOptions, sink: &dyn AnalyticsSink) -> bool {
    if !toast.is_error() {
        return false;
    }
    sink.log_error_toast(&toast.title);
    true
}

/// Background task forwarding error toasts from a channel.
pub struct ErrorToastForwarder {
    task: JoinHandle<usize>,
}

impl ErrorToastForwarder {
    /// Subscribe to `channel` and start forwarding.
    ///
    /// The task runs until every sender of the channel is dropped.
    #[must_use]
    pub fn spawn(channel: &ToastChannel, sink: Arc<dyn AnalyticsSink>) -> Self {
        let mut receiver = channel.subscribe();
        let task = tokio::spawn(async move {
            let mut forwarded = 0;
            loop {
                match receiver.recv().await {
                    Ok(toast) => {
                        if forward_error_toast(&toast, sink.as_ref()) {
                            forwarded += 1;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Error-toast forwarder lagged, toasts skipped");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(forwarded, "Error-toast forwarder stopped");
            forwarded
        });

        Self { task }
    }

    /// Stop forwarding immediately.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the channel to close and return how many toasts were forwarded.
    ///
    /// Returns zero if the task was aborted.
    pub async fn join(self) -> usize {
        self.task.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationSink;
    use std::sync::Mutex;
    use ticket_flow_core::toast::ToastStatus;

    #[derive(Default)]
    struct Collected(Mutex<Vec<String>>);

    impl AnalyticsSink for Collected {
        fn log_error_toast(&self, title: &str) {
            if let Ok(mut titles) = self.0.lock() {
                titles.push(title.to_string());
            }
        }
    }

    #[test]
    fn test_error_toast_is_forwarded() {
        let sink = Collected::default();
        let toast = ToastOptions::new("Showwww error", ToastStatus::Error);

        assert!(forward_error_toast(&toast, &sink));
        assert_eq!(
            *sink.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
            vec!["Showwww error"]
        );
    }

    #[test]
    fn test_non_error_toasts_are_ignored() {
        let sink = Collected::default();

        let warning = ToastOptions::new("not an error", ToastStatus::Warning);
        assert!(!forward_error_toast(&warning, &sink));
        assert!(!forward_error_toast(&ToastOptions::purchased(), &sink));
        assert!(sink.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty());
    }

    #[tokio::test]
    async fn test_forwarder_counts_errors_until_channel_closes() {
        let channel = ToastChannel::new(8);
        let sink = Arc::new(Collected::default());
        let forwarder = ErrorToastForwarder::spawn(&channel, sink.clone());

        channel.show_toast(ToastOptions::new("boom", ToastStatus::Error));
        channel.show_toast(ToastOptions::purchase_canceled());
        channel.show_toast(ToastOptions::new("bang", ToastStatus::Error));
        drop(channel);

        assert_eq!(forwarder.join().await, 2);
        assert_eq!(
            *sink.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
            vec!["boom", "bang"]
        );
    }
}
