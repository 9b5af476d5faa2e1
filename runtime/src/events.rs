//! Trigger events consumed by the coordinator.

use crate::cancellation::CancellationSource;
use ticket_flow_core::types::{HoldCancellation, PaymentDetails, Reservation, TicketAction};

/// Everything needed to turn a hold into a purchase.
///
/// The cancellation source is created with the payload and belongs to this
/// single purchase attempt.
#[derive(Debug, Clone)]
pub struct PurchasePayload {
    /// Reservation to hold first, released once the purchase settles
    pub hold: Reservation,
    /// Reservation request confirming the purchase
    pub purchase: Reservation,
    /// Payment for the purchase
    pub payment: PaymentDetails,
    /// Aborts the in-flight purchase call
    pub cancellation: CancellationSource,
}

impl PurchasePayload {
    /// Create a payload with a fresh cancellation source.
    #[must_use]
    pub fn new(hold: Reservation, purchase: Reservation, payment: PaymentDetails) -> Self {
        Self {
            hold,
            purchase,
            payment,
            cancellation: CancellationSource::new(),
        }
    }
}

/// A request that starts a ticket transaction.
#[derive(Debug, Clone)]
pub enum TicketEvent {
    /// Hold, then release with the given reason
    ReleaseRequested(HoldCancellation),
    /// Hold, then abort with the given reason
    AbortRequested(HoldCancellation),
    /// Hold, then purchase
    PurchaseRequested(PurchasePayload),
}

impl TicketEvent {
    /// Reservation the hold step is run with.
    #[must_use]
    pub const fn hold_reservation(&self) -> &Reservation {
        match self {
            Self::ReleaseRequested(cancellation) | Self::AbortRequested(cancellation) => {
                &cancellation.reservation
            },
            Self::PurchaseRequested(payload) => &payload.hold,
        }
    }

    /// Step the transaction moves to once the hold is confirmed.
    #[must_use]
    pub const fn ticket_action(&self) -> TicketAction {
        match self {
            Self::ReleaseRequested(_) => TicketAction::Release,
            Self::AbortRequested(_) => TicketAction::Abort,
            Self::PurchaseRequested(_) => TicketAction::Purchase,
        }
    }
}
