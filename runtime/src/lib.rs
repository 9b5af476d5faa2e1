//! # Ticket Flow Runtime
//!
//! Async runtime for ticket transactions: hold a reservation, then release,
//! abort or purchase it, with the purchase raced against an abort signal.
//!
//! ## Core Components
//!
//! - **`TicketFlow`**: coordinator running one transaction to its outcome
//! - **`TicketFlowHandle`**: command loop front-end, one transaction at a time
//! - **`ReservationGateway`**: the reservation service seam, plus an in-memory service
//! - **`ToastChannel`** and **`ErrorToastForwarder`**: user notifications and error reporting
//!
//! ## Example
//!
//! ```ignore
//! use ticket_flow_runtime::{FlowEnvironment, TicketFlow, ToastChannel};
//!
//! let flow = TicketFlow::new(FlowEnvironment::new(gateway, Arc::new(toasts), clock));
//! let (handle, _task) = flow.spawn(&config.flow);
//!
//! let pending = handle.purchase(PurchasePayload::new(hold, purchase, payment)).await?;
//! handle.abort_purchase().await?;
//! let outcome = pending.outcome().await?;
//! ```

/// Error-toast forwarding to analytics
pub mod analytics;

/// One-shot cancellation signal for in-flight calls
pub mod cancellation;

/// Configuration from environment variables
pub mod config;

/// Trigger events and purchase payloads
pub mod events;

/// Transaction coordinator
pub mod flow;

/// Reservation service interface and in-memory implementation
pub mod gateway;

/// Background command loop and its handle
pub mod handle;

/// Prometheus metrics for observability
pub mod metrics;

/// Toast delivery
pub mod notifications;

/// Error types for the ticket flow runtime
pub mod error {
    use thiserror::Error;
    use ticket_flow_core::transaction::TransitionError;

    /// Errors returned when starting or driving a transaction
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum FlowError {
        /// A transaction is already active
        ///
        /// Triggers are not queued; the caller may retry once the active
        /// transaction has settled.
        #[error("a ticket transaction is already in progress")]
        TransactionInProgress,

        /// The transaction state refused a step of the flow
        ///
        /// The hold has been released and the state reset before this is
        /// returned.
        #[error("transaction state rejected a step: {0}")]
        Transition(#[from] TransitionError),

        /// The command loop is no longer running
        #[error("ticket flow is not running")]
        Closed,
    }
}

pub use analytics::{AnalyticsSink, ErrorToastForwarder, TracingAnalyticsSink, forward_error_toast};
pub use cancellation::{CancellationSource, CancellationToken};
pub use config::{Config, FlowConfig, GatewayConfig};
pub use error::FlowError;
pub use events::{PurchasePayload, TicketEvent};
pub use flow::{FlowEnvironment, TicketFlow};
pub use gateway::{GatewayResult, InMemoryReservationGateway, ReservationGateway, ServerError};
pub use handle::{FlowCommand, PendingTransaction, TicketFlowHandle};
pub use notifications::{NotificationSink, ToastChannel};
