//! Cancellation handles for in-flight gateway calls.
//!
//! A [`CancellationSource`] is created per purchase attempt. Its tokens are
//! handed to the gateway call; calling [`CancellationSource::cancel`] wakes
//! every token so the call can stop without the server completing it.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cancellation handle.
///
/// Cloning shares the same underlying signal: cancelling any clone cancels
/// them all. Cancelling more than once has no further effect.
#[derive(Clone)]
pub struct CancellationSource {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSource {
    /// Create a fresh, untriggered source.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Hand out a token bound to this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Trigger cancellation.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if the
    /// source was already cancelled.
    pub fn cancel(&self) -> bool {
        self.sender.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Check whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Receiver side of a cancellation handle, passed into a gateway call.
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Check whether the bound source has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the bound source is cancelled.
    ///
    /// Never resolves if the source is dropped without being cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_token() {
        let source = CancellationSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::task::yield_now().await;

        assert!(source.cancel());
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))), "token was not woken");
        assert!(source.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let source = CancellationSource::new();
        let clone = source.clone();

        assert!(source.cancel());
        assert!(!clone.cancel());
        assert!(clone.is_cancelled());
        assert!(source.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_token_taken_after_cancel_resolves_immediately() {
        let source = CancellationSource::new();
        source.cancel();

        let token = source.token();
        let waited = tokio::time::timeout(Duration::from_millis(100), token.cancelled()).await;
        assert!(waited.is_ok(), "late token did not observe cancellation");
    }

    #[tokio::test]
    async fn test_dropped_source_never_cancels() {
        let token = CancellationSource::new().token();
        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
