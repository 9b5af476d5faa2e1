//! Outbound notification channel.
//!
//! Every terminal branch of a transaction emits exactly one
//! [`ToastOptions`] through a [`NotificationSink`]. [`ToastChannel`] fans
//! toasts out to any number of subscribers, such as a UI bridge or the
//! error-toast forwarder.

use std::sync::Arc;
use ticket_flow_core::toast::ToastOptions;
use tokio::sync::broadcast;

/// Receiver of toasts emitted by the coordinator.
pub trait NotificationSink: Send + Sync {
    /// Emit a toast.
    fn show_toast(&self, toast: ToastOptions);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn show_toast(&self, toast: ToastOptions) {
        (**self).show_toast(toast);
    }
}

/// Broadcast channel of toasts.
///
/// Emitting never blocks. Toasts emitted while nobody is subscribed are
/// dropped; slow subscribers skip the oldest toasts once `capacity` is
/// exceeded.
#[derive(Clone, Debug)]
pub struct ToastChannel {
    sender: broadcast::Sender<ToastOptions>,
}

impl ToastChannel {
    /// Create a channel buffering up to `capacity` toasts per subscriber.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every toast emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ToastOptions> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for ToastChannel {
    fn show_toast(&self, toast: ToastOptions) {
        tracing::debug!(title = %toast.title, status = ?toast.status, "Emitting toast");
        if self.sender.send(toast).is_err() {
            tracing::trace!("No toast subscribers");
        }
    }
}
