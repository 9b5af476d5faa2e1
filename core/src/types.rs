//! Value objects passed between the steps of a ticket transaction.

use crate::toast::ToastStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the ticket (or ticket category) being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Generate a new ticket ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-chosen token identifying a hold on the reservation server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldToken(String);

impl HoldToken {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HoldToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A temporary claim on ticket inventory.
///
/// Reservations are immutable: the fields can be read but a reservation is
/// never modified after creation. Release and cancel-purchase calls take the
/// exact reservation they compensate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    ticket_id: TicketId,
    quantity: u32,
    hold_token: HoldToken,
    expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a reservation.
    #[must_use]
    pub const fn new(
        ticket_id: TicketId,
        quantity: u32,
        hold_token: HoldToken,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            quantity,
            hold_token,
            expires_at,
        }
    }

    /// Ticket being held.
    #[must_use]
    pub const fn ticket_id(&self) -> TicketId {
        self.ticket_id
    }

    /// Number of tickets held.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Client-chosen token the server keys this reservation by.
    #[must_use]
    pub const fn hold_token(&self) -> &HoldToken {
        &self.hold_token
    }

    /// When the server drops the hold on its own.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check whether the hold has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Payment method used for a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Credit card
    CreditCard {
        /// Last four digits
        last_four: String,
    },
    /// Digital wallet (Apple Pay, Google Pay)
    DigitalWallet {
        /// Wallet provider name
        provider: String,
    },
}

/// Payment details attached to a purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// How the customer pays
    pub method: PaymentMethod,
    /// Amount in the smallest currency unit
    pub amount_cents: u64,
    /// ISO 4217 currency code
    pub currency: String,
}

/// The kind of step a transaction is performing.
///
/// Recorded in the transaction state and attached to error toasts so that
/// failures can be grouped by the step they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketAction {
    /// Placing the initial hold
    Hold,
    /// Releasing the hold on request
    Release,
    /// Aborting the transaction on request
    Abort,
    /// Converting the hold into a purchase
    Purchase,
}

impl TicketAction {
    /// Lowercase name, used for logging and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Release => "release",
            Self::Abort => "abort",
            Self::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for TicketAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an explicit release or abort request.
///
/// The reason is shown to the user verbatim once the hold has been cleaned
/// up. These are expected terminations, so the status defaults to
/// [`ToastStatus::Warning`] rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldCancellation {
    /// Reservation to hold and then release
    pub reservation: Reservation,
    /// Human-readable reason, used as the toast title
    pub reason: String,
    /// Toast status to show with the reason
    pub status: ToastStatus,
}

impl HoldCancellation {
    /// Create a cancellation with the default warning status.
    #[must_use]
    pub fn new(reservation: Reservation, reason: impl Into<String>) -> Self {
        Self {
            reservation,
            reason: reason.into(),
            status: ToastStatus::Warning,
        }
    }

    /// Override the toast status.
    #[must_use]
    pub fn with_status(mut self, status: ToastStatus) -> Self {
        self.status = status;
        self
    }
}
