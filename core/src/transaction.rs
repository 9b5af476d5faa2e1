//! The single in-flight ticket transaction and its state machine.
//!
//! ```text
//! Idle ──Begin──► Holding ──HoldConfirmed──► Held ──Proceed──► Releasing
//!  ▲                                                     ├──► Aborting
//!  │                                                     └──► Purchasing ──End──► Ended
//!  └──────────────────────── Reset (from any state) ─────────────────────────────┘
//! ```
//!
//! `Reset` and `End` are the only two ways a transaction is finalized.

use crate::environment::Clock;
use crate::reducer::Reducer;
use crate::types::{Reservation, TicketAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where the transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// No transaction, waiting for a trigger
    #[default]
    Idle,
    /// Hold call in flight
    Holding,
    /// Hold confirmed, branch not chosen yet
    Held,
    /// Releasing the hold on explicit request
    Releasing,
    /// Aborting on explicit request
    Aborting,
    /// Purchase race in flight
    Purchasing,
    /// Purchase completed
    Ended,
}

/// State of the single active transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    /// Reservation confirmed by the hold call, absent until it succeeds
    pub reservation: Option<Reservation>,
    /// Step currently being performed
    pub action: Option<TicketAction>,
    /// Lifecycle position
    pub status: TransactionStatus,
    /// Set once a purchase has ended the transaction
    pub completed: bool,
    /// When the hold step started
    pub started_at: Option<DateTime<Utc>>,
    /// When the transaction was ended by a purchase
    pub ended_at: Option<DateTime<Utc>>,
}

impl TransactionState {
    /// Check if a transaction is in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(
            self.status,
            TransactionStatus::Idle | TransactionStatus::Ended
        )
    }

    /// Classify the transaction as an [`Outcome`], if it has one yet.
    ///
    /// A confirmed hold that has not terminated is [`Outcome::Held`]; an
    /// ended transaction is [`Outcome::Purchased`]. Released, aborted and
    /// failed transactions are reset and leave no trace here.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        match self.status {
            TransactionStatus::Held
            | TransactionStatus::Releasing
            | TransactionStatus::Aborting
            | TransactionStatus::Purchasing => Some(Outcome::Held),
            TransactionStatus::Ended => Some(Outcome::Purchased),
            TransactionStatus::Idle | TransactionStatus::Holding => None,
        }
    }
}

/// Transitions of the transaction state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAction {
    /// A trigger arrived; the hold call is about to start
    Begin,
    /// The hold call succeeded
    HoldConfirmed {
        /// Reservation returned by the server
        reservation: Reservation,
    },
    /// Branch into release, abort or purchase
    Proceed {
        /// Step to record
        action: TicketAction,
    },
    /// Clear everything back to Idle
    Reset,
    /// Mark a successful purchase as complete
    End,
}

impl TransactionAction {
    /// Short name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::HoldConfirmed { .. } => "hold_confirmed",
            Self::Proceed { .. } => "proceed",
            Self::Reset => "reset",
            Self::End => "end",
        }
    }
}

/// Rejected transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A transaction is already in flight
    #[error("a transaction is already active (status: {status:?})")]
    AlreadyActive {
        /// Status of the active transaction
        status: TransactionStatus,
    },

    /// The action is not valid from the current status
    #[error("cannot apply `{action}` while {status:?}")]
    InvalidTransition {
        /// Name of the rejected action
        action: &'static str,
        /// Status at the time of rejection
        status: TransactionStatus,
    },
}

/// Terminal classification of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Hold confirmed, not yet terminated
    Held,
    /// Hold released on explicit request
    Released,
    /// Transaction aborted by the user
    Aborted,
    /// Tickets purchased
    Purchased,
    /// A server call failed; carries the failure message
    Failed(String),
}

impl Outcome {
    /// Check whether this outcome ends the transaction.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Held)
    }

    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Released => "released",
            Self::Aborted => "aborted",
            Self::Purchased => "purchased",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Reducer for [`TransactionState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionReducer;

impl TransactionReducer {
    /// Create a new transaction reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for TransactionReducer {
    type State = TransactionState;
    type Action = TransactionAction;
    type Environment = dyn Clock;
    type Error = TransitionError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<(), Self::Error> {
        let invalid = |action: &TransactionAction, status| TransitionError::InvalidTransition {
            action: action.name(),
            status,
        };

        match (state.status, action) {
            (status, TransactionAction::Begin) => {
                if state.is_active() {
                    return Err(TransitionError::AlreadyActive { status });
                }
                *state = TransactionState {
                    action: Some(TicketAction::Hold),
                    status: TransactionStatus::Holding,
                    started_at: Some(env.now()),
                    ..TransactionState::default()
                };
                Ok(())
            },

            (TransactionStatus::Holding, TransactionAction::HoldConfirmed { reservation }) => {
                state.reservation = Some(reservation);
                state.status = TransactionStatus::Held;
                Ok(())
            },

            (TransactionStatus::Held, TransactionAction::Proceed { action }) => {
                let next = match action {
                    TicketAction::Release => TransactionStatus::Releasing,
                    TicketAction::Abort => TransactionStatus::Aborting,
                    TicketAction::Purchase => TransactionStatus::Purchasing,
                    TicketAction::Hold => {
                        return Err(invalid(
                            &TransactionAction::Proceed { action },
                            TransactionStatus::Held,
                        ));
                    },
                };
                state.action = Some(action);
                state.status = next;
                Ok(())
            },

            (_, TransactionAction::Reset) => {
                *state = TransactionState::default();
                Ok(())
            },

            (TransactionStatus::Purchasing, TransactionAction::End) => {
                state.status = TransactionStatus::Ended;
                state.completed = true;
                state.ended_at = Some(env.now());
                Ok(())
            },

            // Invalid transitions
            (status, action) => Err(invalid(&action, status)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::{HoldToken, TicketId};
    use proptest::prelude::*;

    fn reservation() -> Reservation {
        Reservation::new(TicketId::new(), 1, HoldToken::new("h"), Utc::now())
    }

    fn apply(
        state: &mut TransactionState,
        action: TransactionAction,
    ) -> Result<(), TransitionError> {
        TransactionReducer::new().reduce(state, action, &SystemClock)
    }

    fn held() -> TransactionState {
        let mut state = TransactionState::default();
        apply(&mut state, TransactionAction::Begin).unwrap();
        apply(
            &mut state,
            TransactionAction::HoldConfirmed {
                reservation: reservation(),
            },
        )
        .unwrap();
        state
    }

    #[test]
    fn test_begin_records_hold() {
        let mut state = TransactionState::default();
        apply(&mut state, TransactionAction::Begin).unwrap();

        assert_eq!(state.status, TransactionStatus::Holding);
        assert_eq!(state.action, Some(TicketAction::Hold));
        assert!(state.started_at.is_some());
        assert!(state.reservation.is_none());
        assert!(state.is_active());
        assert_eq!(state.outcome(), None);
    }

    #[test]
    fn test_begin_rejected_while_active() {
        let mut state = held();
        let before = state.clone();

        let err = apply(&mut state, TransactionAction::Begin).unwrap_err();
        assert_eq!(
            err,
            TransitionError::AlreadyActive {
                status: TransactionStatus::Held
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_proceed_branches() {
        for (action, status) in [
            (TicketAction::Release, TransactionStatus::Releasing),
            (TicketAction::Abort, TransactionStatus::Aborting),
            (TicketAction::Purchase, TransactionStatus::Purchasing),
        ] {
            let mut state = held();
            apply(&mut state, TransactionAction::Proceed { action }).unwrap();
            assert_eq!(state.status, status);
            assert_eq!(state.action, Some(action));
            assert_eq!(state.outcome(), Some(Outcome::Held));
        }
    }

    #[test]
    fn test_proceed_with_hold_is_invalid() {
        let mut state = held();
        let err = apply(
            &mut state,
            TransactionAction::Proceed {
                action: TicketAction::Hold,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { action: "proceed", .. }));
        assert_eq!(state.status, TransactionStatus::Held);
    }

    #[test]
    fn test_end_marks_complete_without_clearing() {
        let mut state = held();
        apply(
            &mut state,
            TransactionAction::Proceed {
                action: TicketAction::Purchase,
            },
        )
        .unwrap();
        apply(&mut state, TransactionAction::End).unwrap();

        assert_eq!(state.status, TransactionStatus::Ended);
        assert!(state.completed);
        assert!(state.ended_at.is_some());
        assert!(state.reservation.is_some());
        assert!(!state.is_active());
        assert_eq!(state.outcome(), Some(Outcome::Purchased));
    }

    #[test]
    fn test_end_outside_purchase_is_invalid() {
        let mut state = held();
        assert!(apply(&mut state, TransactionAction::End).is_err());
    }

    #[test]
    fn test_new_transaction_after_end() {
        let mut state = held();
        apply(
            &mut state,
            TransactionAction::Proceed {
                action: TicketAction::Purchase,
            },
        )
        .unwrap();
        apply(&mut state, TransactionAction::End).unwrap();

        apply(&mut state, TransactionAction::Begin).unwrap();
        assert_eq!(state.status, TransactionStatus::Holding);
        assert!(!state.completed);
        assert!(state.reservation.is_none());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Failed("boom".into()).to_string(), "failed: boom");
        assert_eq!(Outcome::Released.to_string(), "released");
        assert!(!Outcome::Held.is_terminal());
        assert!(Outcome::Aborted.is_terminal());
    }

    fn arb_action() -> impl Strategy<Value = TransactionAction> {
        prop_oneof![
            Just(TransactionAction::Begin),
            Just(TransactionAction::HoldConfirmed {
                reservation: Reservation::new(
                    TicketId::from_uuid(uuid::Uuid::nil()),
                    1,
                    HoldToken::new("h"),
                    DateTime::<Utc>::UNIX_EPOCH,
                ),
            }),
            Just(TransactionAction::Proceed { action: TicketAction::Hold }),
            Just(TransactionAction::Proceed { action: TicketAction::Release }),
            Just(TransactionAction::Proceed { action: TicketAction::Abort }),
            Just(TransactionAction::Proceed { action: TicketAction::Purchase }),
            Just(TransactionAction::End),
            Just(TransactionAction::Reset),
        ]
    }

    proptest! {
        #[test]
        fn prop_reset_always_clears(actions in proptest::collection::vec(arb_action(), 0..20)) {
            let mut state = TransactionState::default();
            for action in actions {
                let _ = apply(&mut state, action);
            }
            apply(&mut state, TransactionAction::Reset).unwrap();
            prop_assert_eq!(state, TransactionState::default());
        }

        #[test]
        fn prop_rejected_actions_leave_state_untouched(
            actions in proptest::collection::vec(arb_action(), 0..20)
        ) {
            let mut state = TransactionState::default();
            for action in actions {
                let before = state.clone();
                if apply(&mut state, action).is_err() {
                    prop_assert_eq!(&state, &before);
                }
                prop_assert_eq!(state.completed, state.status == TransactionStatus::Ended);
            }
        }
    }
}
