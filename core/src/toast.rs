//! User-facing notifications emitted at the end of every transaction branch.

use crate::types::TicketAction;
use serde::{Deserialize, Serialize};

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastStatus {
    /// The transaction reached its goal
    Success,
    /// Expected termination (release, abort, canceled purchase)
    Warning,
    /// Server failure
    Error,
}

/// A transient notification shown to the user.
///
/// Toasts are pure side-effect payloads: they are emitted and never stored by
/// the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastOptions {
    /// Text shown to the user
    pub title: String,
    /// Severity
    pub status: ToastStatus,
    /// Step the transaction was in when an error occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_action: Option<TicketAction>,
}

impl ToastOptions {
    /// Create an untagged toast.
    #[must_use]
    pub fn new(title: impl Into<String>, status: ToastStatus) -> Self {
        Self {
            title: title.into(),
            status,
            ticket_action: None,
        }
    }

    /// Toast shown when a purchase completes.
    #[must_use]
    pub fn purchased() -> Self {
        Self::new("tickets purchased", ToastStatus::Success)
    }

    /// Toast shown when the user aborts a pending purchase.
    #[must_use]
    pub fn purchase_canceled() -> Self {
        Self::new("purchase canceled", ToastStatus::Warning)
    }

    /// Check whether this toast reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ToastStatus::Error
    }
}

/// Build the error toast for a failed server call.
///
/// The failure message becomes the title unchanged; the step the transaction
/// was in is attached as the `ticket_action` tag. An empty message falls back
/// to a generic title so the user never sees a blank toast.
#[must_use]
pub fn generate_error_toast_options(message: &str, action: TicketAction) -> ToastOptions {
    let title = if message.trim().is_empty() {
        format!("{action} failed")
    } else {
        message.to_string()
    };

    ToastOptions {
        title,
        status: ToastStatus::Error,
        ticket_action: Some(action),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_toast_uses_message_as_title() {
        let toast = generate_error_toast_options("network down", TicketAction::Hold);

        assert_eq!(toast.title, "network down");
        assert_eq!(toast.status, ToastStatus::Error);
        assert_eq!(toast.ticket_action, Some(TicketAction::Hold));
        assert!(toast.is_error());
    }

    #[test]
    fn test_error_toast_blank_message_falls_back() {
        let toast = generate_error_toast_options("  ", TicketAction::Purchase);
        assert_eq!(toast.title, "purchase failed");
    }

    #[test]
    fn test_untagged_toast_serialization() {
        let json = serde_json::to_value(ToastOptions::purchase_canceled()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "title": "purchase canceled", "status": "warning" })
        );
    }

    #[test]
    fn test_tagged_toast_round_trips() {
        let toast = generate_error_toast_options("sold out", TicketAction::Purchase);
        let json = serde_json::to_string(&toast).unwrap();
        assert!(json.contains("\"ticket_action\":\"purchase\""));

        let back: ToastOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, toast);
    }
}
