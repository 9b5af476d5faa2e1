//! # Ticket Flow Core
//!
//! Domain types and the pure state machine behind the ticket transaction
//! orchestrator.
//!
//! This crate holds no I/O. The runtime crate drives the protocol against a
//! reservation server and feeds every state change through the reducer
//! defined here.
//!
//! ## Core Concepts
//!
//! - **Reservation**: an immutable description of a held ticket
//! - **Hold cancellation**: the reason and status carried by release and abort requests
//! - **`TransactionState`**: the single in-flight transaction
//! - **Reducer**: `(State, Action, Environment) → State`, the only way state changes
//! - **Toast**: the user-facing notification produced by every terminal branch
//!
//! ## Example
//!
//! ```
//! use ticket_flow_core::environment::SystemClock;
//! use ticket_flow_core::reducer::Reducer;
//! use ticket_flow_core::transaction::{
//!     TransactionAction, TransactionReducer, TransactionState, TransactionStatus,
//! };
//! use ticket_flow_core::types::TicketAction;
//!
//! let reducer = TransactionReducer::new();
//! let mut state = TransactionState::default();
//!
//! reducer
//!     .reduce(&mut state, TransactionAction::Begin, &SystemClock)
//!     .unwrap();
//! assert_eq!(state.status, TransactionStatus::Holding);
//! assert_eq!(state.action, Some(TicketAction::Hold));
//!
//! reducer
//!     .reduce(&mut state, TransactionAction::Reset, &SystemClock)
//!     .unwrap();
//! assert_eq!(state, TransactionState::default());
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod toast;
pub mod transaction;
pub mod types;

/// Reducer module - the pure state transition abstraction
///
/// Reducers validate an action against the current state and apply it in
/// place. They never perform I/O; the runtime decides what to call next based
/// on the resulting state.
pub mod reducer {
    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Error`: Returned when an action is not valid for the current state
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TransactionReducer {
    ///     type State = TransactionState;
    ///     type Action = TransactionAction;
    ///     type Environment = dyn Clock;
    ///     type Error = TransitionError;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut TransactionState,
    ///         action: TransactionAction,
    ///         env: &dyn Clock,
    ///     ) -> Result<(), TransitionError> {
    ///         // Transition logic goes here
    ///         Ok(())
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment: ?Sized;

        /// The error returned for rejected transitions
        type Error;

        /// Reduce an action into a state change
        ///
        /// Implementations must leave `state` untouched when they return an
        /// error.
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when `action` is not a valid transition from
        /// the current state.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<(), Self::Error>;
    }
}

/// Environment module - Dependency injection traits
///
/// External dependencies of the pure core are abstracted behind traits and
/// injected via the Environment parameter of a reducer.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ticket_flow_core::environment::{Clock, SystemClock};
    ///
    /// let before = chrono::Utc::now();
    /// assert!(SystemClock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use toast::{generate_error_toast_options, ToastOptions, ToastStatus};
pub use transaction::{
    Outcome, TransactionAction, TransactionReducer, TransactionState, TransactionStatus,
    TransitionError,
};
pub use types::{
    HoldCancellation, HoldToken, PaymentDetails, PaymentMethod, Reservation, TicketAction,
    TicketId,
};
