//! # Ticket Flow Testing
//!
//! Testing utilities for the ticket flow orchestrator.
//!
//! This crate provides:
//! - A fixed clock for deterministic timestamps
//! - A scripted reservation gateway that journals every call
//! - Recording notification and analytics sinks sharing the same journal
//! - Fixtures for reservations and purchase payloads
//! - A fluent `ReducerTest` for the transaction reducer
//!
//! ## Example
//!
//! ```ignore
//! use ticket_flow_testing::{fixtures, mocks::{Call, MockReservationGateway, Reply}};
//!
//! #[tokio::test]
//! async fn test_purchase() {
//!     let gateway = MockReservationGateway::new().on_reserve("purchase-1", Reply::Succeed);
//!     let flow = fixtures::flow_with(&gateway);
//!
//!     let payload = fixtures::purchase_payload();
//!     flow.purchase_tickets(&payload, std::future::pending()).await.unwrap();
//!
//!     assert!(gateway.journal().calls().contains(&Call::Release("hold-1".into())));
//! }
//! ```

use chrono::{DateTime, Utc};
use ticket_flow_core::environment::Clock;


/// Mock implementations of the flow's dependencies.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use ticket_flow_core::toast::ToastOptions;
    use ticket_flow_core::types::Reservation;
    use ticket_flow_runtime::analytics::AnalyticsSink;
    use ticket_flow_runtime::cancellation::CancellationToken;
    use ticket_flow_runtime::gateway::{GatewayResult, ReservationGateway, ServerError};
    use ticket_flow_runtime::notifications::NotificationSink;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_flow_testing::mocks::FixedClock;
    /// use ticket_flow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which never happens.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// One observable side effect of a transaction.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        /// `reserve` was called for this hold token
        Reserve {
            /// Hold token of the request
            token: String,
            /// Whether a cancellation token was passed
            cancellable: bool,
        },
        /// `release` was called for this hold token
        Release(String),
        /// `cancel_purchase` was called for this hold token
        CancelPurchase(String),
        /// The cancellation token passed to `reserve` for this hold token fired
        Cancel(String),
        /// A toast was shown
        Toast(ToastOptions),
    }

    /// Ordered log of calls shared between mocks.
    ///
    /// Cancellation tokens handed to `reserve` are watched: a [`Call::Cancel`]
    /// is logged ahead of the first call recorded after the token fired.
    #[derive(Debug, Clone, Default)]
    pub struct Journal {
        calls: Arc<Mutex<Vec<Call>>>,
        watched: Arc<Mutex<Vec<(String, CancellationToken)>>>,
    }

    impl Journal {
        /// Create an empty journal
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a call
        pub fn record(&self, call: Call) {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            self.note_cancellations(&mut calls);
            calls.push(call);
        }

        /// Log [`Call::Cancel`] once `token` fires
        pub fn watch(&self, hold_token: &str, token: CancellationToken) {
            self.watched
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((hold_token.to_string(), token));
        }

        fn note_cancellations(&self, calls: &mut Vec<Call>) {
            let mut watched = self.watched.lock().unwrap_or_else(PoisonError::into_inner);
            watched.retain(|(hold_token, token)| {
                if token.is_cancelled() {
                    calls.push(Call::Cancel(hold_token.clone()));
                    false
                } else {
                    true
                }
            });
        }

        /// Every call so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<Call> {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            self.note_cancellations(&mut calls);
            calls.clone()
        }

        /// Toasts shown so far, in order
        #[must_use]
        pub fn toasts(&self) -> Vec<ToastOptions> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Toast(toast) => Some(toast),
                    _ => None,
                })
                .collect()
        }

        /// Gateway calls so far, in order
        #[must_use]
        pub fn gateway_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| !matches!(call, Call::Toast(_) | Call::Cancel(_)))
                .collect()
        }

        /// Number of release calls for `token`
        #[must_use]
        pub fn releases_of(&self, token: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, Call::Release(t) if t == token))
                .count()
        }
    }

    /// Scripted answer to a `reserve` call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Reply {
        /// Confirm the request unchanged
        Succeed,
        /// Fail with the given error
        Fail(ServerError),
        /// Never answer
        Hang,
    }

    #[derive(Debug, Clone)]
    struct Script {
        reply: Reply,
        delay: Duration,
    }

    /// Reservation gateway with scripted replies.
    ///
    /// Replies are chosen by the request's hold token; unscripted tokens
    /// succeed immediately. Release and rollback calls succeed unless
    /// [`MockReservationGateway::fail_releases`] was set.
    #[derive(Debug, Clone, Default)]
    pub struct MockReservationGateway {
        journal: Journal,
        scripts: HashMap<String, Script>,
        release_error: Option<ServerError>,
    }

    impl MockReservationGateway {
        /// Create a gateway where every call succeeds
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `reserve` for `token` with `reply`
        #[must_use]
        pub fn on_reserve(self, token: &str, reply: Reply) -> Self {
            self.on_reserve_after(token, reply, Duration::ZERO)
        }

        /// Answer `reserve` for `token` with `reply` after `delay`
        #[must_use]
        pub fn on_reserve_after(mut self, token: &str, reply: Reply, delay: Duration) -> Self {
            self.scripts
                .insert(token.to_string(), Script { reply, delay });
            self
        }

        /// Fail every `release` call with `error`
        #[must_use]
        pub fn fail_releases(mut self, error: ServerError) -> Self {
            self.release_error = Some(error);
            self
        }

        /// Journal shared by this gateway and its notifier
        #[must_use]
        pub fn journal(&self) -> Journal {
            self.journal.clone()
        }

        /// Notifier writing toasts into this gateway's journal
        #[must_use]
        pub fn notifier(&self) -> RecordingNotifier {
            RecordingNotifier {
                journal: self.journal.clone(),
            }
        }

        /// Creates an Arc-wrapped instance for sharing
        #[must_use]
        pub fn shared(&self) -> Arc<dyn ReservationGateway> {
            Arc::new(self.clone())
        }
    }

    impl ReservationGateway for MockReservationGateway {
        fn reserve(
            &self,
            request: &Reservation,
            token: Option<CancellationToken>,
        ) -> BoxFuture<'static, GatewayResult<Reservation>> {
            let key = request.hold_token().as_str().to_string();
            self.journal.record(Call::Reserve {
                token: key.clone(),
                cancellable: token.is_some(),
            });
            if let Some(token) = &token {
                self.journal.watch(&key, token.clone());
            }

            let script = self.scripts.get(&key).cloned().unwrap_or(Script {
                reply: Reply::Succeed,
                delay: Duration::ZERO,
            });
            let request = request.clone();

            Box::pin(async move {
                let answer = async move {
                    if !script.delay.is_zero() {
                        tokio::time::sleep(script.delay).await;
                    }
                    match script.reply {
                        Reply::Succeed => Ok(request),
                        Reply::Fail(error) => Err(error),
                        Reply::Hang => std::future::pending().await,
                    }
                };

                match token {
                    Some(token) => tokio::select! {
                        () = token.cancelled() => Err(ServerError::Cancelled),
                        result = answer => result,
                    },
                    None => answer.await,
                }
            })
        }

        fn release(&self, reservation: &Reservation) -> BoxFuture<'static, GatewayResult<()>> {
            self.journal
                .record(Call::Release(reservation.hold_token().as_str().to_string()));
            let result = self.release_error.clone().map_or(Ok(()), Err);
            Box::pin(async move { result })
        }

        fn cancel_purchase(
            &self,
            reservation: &Reservation,
        ) -> BoxFuture<'static, GatewayResult<()>> {
            self.journal.record(Call::CancelPurchase(
                reservation.hold_token().as_str().to_string(),
            ));
            Box::pin(async { Ok(()) })
        }
    }

    /// Notification sink that records toasts in a [`Journal`].
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        journal: Journal,
    }

    impl RecordingNotifier {
        /// Create a notifier with its own journal
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Toasts shown so far
        #[must_use]
        pub fn toasts(&self) -> Vec<ToastOptions> {
            self.journal.toasts()
        }
    }

    impl NotificationSink for RecordingNotifier {
        fn show_toast(&self, toast: ToastOptions) {
            self.journal.record(Call::Toast(toast));
        }
    }

    /// Analytics sink that collects forwarded titles.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingAnalyticsSink {
        titles: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingAnalyticsSink {
        /// Create an empty sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Titles forwarded so far
        #[must_use]
        pub fn titles(&self) -> Vec<String> {
            self.titles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl AnalyticsSink for RecordingAnalyticsSink {
        fn log_error_toast(&self, title: &str) {
            self.titles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(title.to_string());
        }
    }
}

/// Reservations, payloads and wired-up flows for tests.
pub mod fixtures {
    use super::mocks::{test_clock, MockReservationGateway};
    use chrono::Duration;
    use std::sync::Arc;
    use ticket_flow_core::environment::Clock;
    use ticket_flow_core::types::{
        HoldCancellation, HoldToken, PaymentDetails, PaymentMethod, Reservation, TicketId,
    };
    use ticket_flow_runtime::events::PurchasePayload;
    use ticket_flow_runtime::flow::{FlowEnvironment, TicketFlow};
    use uuid::Uuid;

    /// Hold token used by [`hold_reservation`]
    pub const HOLD_TOKEN: &str = "hold-1";

    /// Hold token used by [`purchase_reservation`]
    pub const PURCHASE_TOKEN: &str = "purchase-1";

    /// Ticket shared by every fixture
    #[must_use]
    pub const fn ticket_id() -> TicketId {
        TicketId::from_uuid(Uuid::from_u128(0x7ec1_0001))
    }

    fn reservation(token: &str) -> Reservation {
        Reservation::new(
            ticket_id(),
            2,
            HoldToken::new(token),
            test_clock().now() + Duration::minutes(5),
        )
    }

    /// Two seats held under [`HOLD_TOKEN`]
    #[must_use]
    pub fn hold_reservation() -> Reservation {
        reservation(HOLD_TOKEN)
    }

    /// Two seats requested for purchase under [`PURCHASE_TOKEN`]
    #[must_use]
    pub fn purchase_reservation() -> Reservation {
        reservation(PURCHASE_TOKEN)
    }

    /// Card payment of 50.00 USD
    #[must_use]
    pub fn card_payment() -> PaymentDetails {
        PaymentDetails {
            method: PaymentMethod::CreditCard {
                last_four: "4242".to_string(),
            },
            amount_cents: 5_000,
            currency: "USD".to_string(),
        }
    }

    /// Purchase of [`purchase_reservation`] backed by [`hold_reservation`]
    #[must_use]
    pub fn purchase_payload() -> PurchasePayload {
        PurchasePayload::new(hold_reservation(), purchase_reservation(), card_payment())
    }

    /// Cancellation of [`hold_reservation`] with the default warning status
    #[must_use]
    pub fn hold_cancellation(reason: &str) -> HoldCancellation {
        HoldCancellation::new(hold_reservation(), reason)
    }

    /// Coordinator wired to `gateway`, its recording notifier and the test clock
    #[must_use]
    pub fn flow_with(gateway: &MockReservationGateway) -> TicketFlow {
        TicketFlow::new(FlowEnvironment::new(
            gateway.shared(),
            Arc::new(gateway.notifier()),
            Arc::new(test_clock()),
        ))
    }
}

/// Test helpers
pub mod helpers {
    /// Install a test-friendly tracing subscriber.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies using proptest.
pub mod properties {
    use proptest::prelude::*;
    use ticket_flow_core::types::TicketAction;

    /// Any ticket action
    pub fn arb_ticket_action() -> impl Strategy<Value = TicketAction> {
        prop_oneof![
            Just(TicketAction::Hold),
            Just(TicketAction::Release),
            Just(TicketAction::Abort),
            Just(TicketAction::Purchase),
        ]
    }

    /// How a purchase race is set up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RaceSetup {
        /// Purchase answers successfully after `purchase_ms`, abort after `abort_ms`
        Succeeds {
            /// Purchase latency
            purchase_ms: u64,
            /// Abort delay, `None` if never signalled
            abort_ms: Option<u64>,
        },
        /// Purchase fails after `purchase_ms`, abort after `abort_ms`
        Fails {
            /// Purchase latency
            purchase_ms: u64,
            /// Abort delay, `None` if never signalled
            abort_ms: Option<u64>,
        },
    }

    /// Race setups with latencies up to two seconds
    pub fn arb_race_setup() -> impl Strategy<Value = RaceSetup> {
        let timing = (1..2_000u64, proptest::option::of(0..2_000u64));
        (any::<bool>(), timing).prop_map(|(succeeds, (purchase_ms, abort_ms))| {
            if succeeds {
                RaceSetup::Succeeds {
                    purchase_ms,
                    abort_ms,
                }
            } else {
                RaceSetup::Fails {
                    purchase_ms,
                    abort_ms,
                }
            }
        })
    }
}

// Re-export commonly used items
pub use mocks::{
    Call, FixedClock, Journal, MockReservationGateway, RecordingAnalyticsSink, RecordingNotifier,
    Reply, test_clock,
};
pub use reducer_test::ReducerTest;
