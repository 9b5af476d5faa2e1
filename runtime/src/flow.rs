//! Ticket transaction coordinator.
//!
//! ```text
//! TicketEvent ──► ticket_flow ──reserve(hold)──► Held
//!                     │                           │
//!                     │ hold failed               ├─ ReleaseRequested ─► toast(reason) ─► cancel_transaction
//!                     ▼                           ├─ AbortRequested ───► toast(reason) ─► cancel_transaction
//!        error toast ─► cancel_transaction        └─ PurchaseRequested ─► purchase_tickets
//!
//! purchase_tickets: select! { reserve(purchase, token), abort }
//!   purchase ok    ─► "tickets purchased" ─► release(hold) ─► End
//!   abort wins     ─► cancel() ─► cancel_purchase ─► "purchase canceled" ─► cancel_transaction
//!   purchase error ─► cancel_purchase ─► error toast ─► cancel_transaction
//! ```
//!
//! Every branch that does not end in a purchase goes through the same cleanup
//! as [`TicketFlow::cancel_transaction`], which releases the hold before the
//! state is reset.

use crate::error::FlowError;
use crate::events::{PurchasePayload, TicketEvent};
use crate::gateway::{GatewayResult, ReservationGateway};
use crate::notifications::NotificationSink;
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use ticket_flow_core::environment::Clock;
use ticket_flow_core::reducer::Reducer;
use ticket_flow_core::toast::{generate_error_toast_options, ToastOptions};
use ticket_flow_core::transaction::{
    Outcome, TransactionAction, TransactionReducer, TransactionState, TransitionError,
};
use ticket_flow_core::types::{HoldCancellation, Reservation, TicketAction};
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Dependencies of the coordinator.
#[derive(Clone)]
pub struct FlowEnvironment {
    /// Reservation service
    pub gateway: Arc<dyn ReservationGateway>,
    /// Where toasts go
    pub notifier: Arc<dyn NotificationSink>,
    /// Clock for transaction timestamps
    pub clock: Arc<dyn Clock>,
}

impl FlowEnvironment {
    /// Create an environment.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ReservationGateway>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            notifier,
            clock,
        }
    }
}

enum PurchaseRace {
    Settled(GatewayResult<Reservation>),
    Aborted,
}

/// Coordinates one ticket transaction at a time.
///
/// The coordinator owns the [`TransactionState`] and is its only writer.
/// Clones share the same state and the same run lock, so a transaction and a
/// cleanup started from different clones never overlap.
#[derive(Clone)]
pub struct TicketFlow {
    env: FlowEnvironment,
    state: Arc<RwLock<TransactionState>>,
    running: Arc<Mutex<()>>,
    reducer: TransactionReducer,
}

impl TicketFlow {
    /// Create a coordinator with an empty transaction state.
    #[must_use]
    pub fn new(env: FlowEnvironment) -> Self {
        Self {
            env,
            state: Arc::new(RwLock::new(TransactionState::default())),
            running: Arc::new(Mutex::new(())),
            reducer: TransactionReducer::new(),
        }
    }

    /// Snapshot of the current transaction state.
    pub async fn state(&self) -> TransactionState {
        self.state.read().await.clone()
    }

    pub(crate) fn shared_state(&self) -> Arc<RwLock<TransactionState>> {
        Arc::clone(&self.state)
    }

    fn try_run(&self) -> Result<MutexGuard<'_, ()>, FlowError> {
        self.running
            .try_lock()
            .map_err(|_| FlowError::TransactionInProgress)
    }

    async fn dispatch(&self, action: TransactionAction) -> Result<(), TransitionError> {
        let name = action.name();
        let mut state = self.state.write().await;
        match self.reducer.reduce(&mut state, action, self.env.clock.as_ref()) {
            Ok(()) => {
                tracing::debug!(action = name, status = ?state.status, "Transaction transition");
                Ok(())
            },
            Err(error) => {
                tracing::error!(action = name, %error, "Rejected transaction transition");
                Err(error)
            },
        }
    }

    async fn recorded_action(&self) -> TicketAction {
        self.state.read().await.action.unwrap_or(TicketAction::Hold)
    }

    async fn show_error(&self, error: &crate::gateway::ServerError) {
        let toast = generate_error_toast_options(&error.to_string(), self.recorded_action().await);
        self.env.notifier.show_toast(toast);
    }

    /// Release `reservation` and reset the transaction.
    ///
    /// Release failures are logged and swallowed. The reset always happens,
    /// and only after the release call has settled. Also recovers a state
    /// left active by a transaction whose future was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::TransactionInProgress`] without touching the
    /// gateway or the state while a transaction is running.
    pub async fn cancel_transaction(&self, reservation: &Reservation) -> Result<(), FlowError> {
        let _running = self.try_run()?;
        self.clean_up(reservation).await;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(hold_token = %reservation.hold_token()))]
    async fn clean_up(&self, reservation: &Reservation) {
        if let Err(error) = self.env.gateway.release(reservation).await {
            tracing::warn!(%error, "Release failed during cleanup");
            counter!("ticket_flow_cleanup_release_failures_total").increment(1);
        }
        // Reset is valid from every state.
        let _ = self.dispatch(TransactionAction::Reset).await;
    }

    /// Run one transaction for `event` to its terminal outcome.
    ///
    /// `abort` is the abort signal raced against the purchase call; it is
    /// only polled while a purchase is in flight.
    ///
    /// # Errors
    ///
    /// - [`FlowError::TransactionInProgress`] without touching the gateway if
    ///   another transaction is active
    /// - [`FlowError::Transition`] if the state refuses the confirmed hold;
    ///   the hold is released first
    #[tracing::instrument(skip_all, fields(action = %event.ticket_action()))]
    pub async fn ticket_flow<F>(&self, event: TicketEvent, abort: F) -> Result<Outcome, FlowError>
    where
        F: Future<Output = ()>,
    {
        let _running = self.try_run()?;
        if self.dispatch(TransactionAction::Begin).await.is_err() {
            return Err(FlowError::TransactionInProgress);
        }

        let action = event.ticket_action();
        counter!("ticket_flow_transactions_started_total", "action" => action.as_str())
            .increment(1);
        tracing::info!("Transaction started");

        let hold = event.hold_reservation().clone();
        let outcome = match self.env.gateway.reserve(&hold, None).await {
            Err(error) => {
                tracing::warn!(%error, "Hold failed");
                self.show_error(&error).await;
                self.clean_up(&hold).await;
                Outcome::Failed(error.to_string())
            },
            Ok(confirmed) => {
                if let Err(error) = self.confirm_hold(confirmed, action).await {
                    self.clean_up(&hold).await;
                    return Err(FlowError::Transition(error));
                }

                match event {
                    TicketEvent::ReleaseRequested(cancellation) => {
                        self.cancel_hold(&cancellation).await;
                        Outcome::Released
                    },
                    TicketEvent::AbortRequested(cancellation) => {
                        self.cancel_hold(&cancellation).await;
                        Outcome::Aborted
                    },
                    TicketEvent::PurchaseRequested(payload) => {
                        self.race_purchase(&payload, abort).await
                    },
                }
            },
        };

        counter!("ticket_flow_transaction_outcomes_total", "outcome" => outcome.as_str())
            .increment(1);
        tracing::info!(%outcome, "Transaction finished");
        Ok(outcome)
    }

    async fn confirm_hold(
        &self,
        reservation: Reservation,
        action: TicketAction,
    ) -> Result<(), TransitionError> {
        self.dispatch(TransactionAction::HoldConfirmed { reservation })
            .await?;
        self.dispatch(TransactionAction::Proceed { action }).await
    }

    async fn cancel_hold(&self, cancellation: &HoldCancellation) {
        self.env.notifier.show_toast(ToastOptions::new(
            cancellation.reason.clone(),
            cancellation.status,
        ));
        self.clean_up(&cancellation.reservation).await;
    }

    /// Race the purchase call against `abort` and settle the transaction.
    ///
    /// Exactly one of the success, abort and error branches runs. The losing
    /// side of the race is dropped, so a late purchase result never produces
    /// side effects.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::TransactionInProgress`] without calling the
    /// gateway while a transaction is running.
    pub async fn purchase_tickets<F>(
        &self,
        payload: &PurchasePayload,
        abort: F,
    ) -> Result<Outcome, FlowError>
    where
        F: Future<Output = ()>,
    {
        let _running = self.try_run()?;
        Ok(self.race_purchase(payload, abort).await)
    }

    #[tracing::instrument(skip_all, fields(hold_token = %payload.hold.hold_token()))]
    async fn race_purchase<F>(&self, payload: &PurchasePayload, abort: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let purchase = self
            .env
            .gateway
            .reserve(&payload.purchase, Some(payload.cancellation.token()));

        let race = tokio::select! {
            // An abort that is already pending wins over a result ready in the same poll.
            biased;
            () = abort => PurchaseRace::Aborted,
            result = purchase => PurchaseRace::Settled(result),
        };
        histogram!("ticket_flow_purchase_duration_seconds").record(started.elapsed().as_secs_f64());

        match race {
            PurchaseRace::Settled(Ok(purchased)) => {
                tracing::info!(
                    ticket_id = %purchased.ticket_id(),
                    quantity = purchased.quantity(),
                    amount_cents = payload.payment.amount_cents,
                    "Purchase confirmed"
                );
                self.env.notifier.show_toast(ToastOptions::purchased());
                if let Err(error) = self.env.gateway.release(&payload.hold).await {
                    tracing::warn!(%error, "Release of superseded hold failed");
                    counter!("ticket_flow_cleanup_release_failures_total").increment(1);
                }
                if self.dispatch(TransactionAction::End).await.is_err() {
                    // Called outside a transaction: nothing to end.
                    let _ = self.dispatch(TransactionAction::Reset).await;
                }
                Outcome::Purchased
            },
            PurchaseRace::Aborted => {
                if !payload.cancellation.cancel() {
                    tracing::debug!("Purchase call was already cancelled");
                }
                self.roll_back_purchase(&payload.purchase).await;
                self.env.notifier.show_toast(ToastOptions::purchase_canceled());
                self.clean_up(&payload.hold).await;
                Outcome::Aborted
            },
            PurchaseRace::Settled(Err(error)) => {
                tracing::warn!(%error, "Purchase failed");
                self.roll_back_purchase(&payload.purchase).await;
                self.show_error(&error).await;
                self.clean_up(&payload.hold).await;
                Outcome::Failed(error.to_string())
            },
        }
    }

    async fn roll_back_purchase(&self, purchase: &Reservation) {
        if let Err(error) = self.env.gateway.cancel_purchase(purchase).await {
            tracing::warn!(%error, "Purchase rollback failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::InMemoryReservationGateway;
    use crate::notifications::ToastChannel;
    use chrono::Utc;
    use ticket_flow_core::environment::SystemClock;
    use ticket_flow_core::toast::ToastStatus;
    use ticket_flow_core::transaction::TransactionStatus;
    use ticket_flow_core::types::{HoldToken, PaymentDetails, PaymentMethod, TicketId};
    use tokio::sync::broadcast;

    struct Harness {
        flow: TicketFlow,
        gateway: InMemoryReservationGateway,
        toasts: broadcast::Receiver<ToastOptions>,
    }

    fn harness(initial_inventory: u32) -> Harness {
        let gateway = InMemoryReservationGateway::new(GatewayConfig {
            latency_ms: 0,
            hold_ttl_secs: 60,
            failure_rate: 0.0,
            initial_inventory,
        });
        let channel = ToastChannel::new(16);
        let toasts = channel.subscribe();
        let flow = TicketFlow::new(FlowEnvironment::new(
            Arc::new(gateway.clone()),
            Arc::new(channel),
            Arc::new(SystemClock),
        ));
        Harness {
            flow,
            gateway,
            toasts,
        }
    }

    fn drain(toasts: &mut broadcast::Receiver<ToastOptions>) -> Vec<ToastOptions> {
        std::iter::from_fn(|| toasts.try_recv().ok()).collect()
    }

    fn reservation(ticket_id: TicketId, quantity: u32, token: &str) -> Reservation {
        Reservation::new(ticket_id, quantity, HoldToken::new(token), Utc::now())
    }

    fn payment() -> PaymentDetails {
        PaymentDetails {
            method: PaymentMethod::CreditCard {
                last_four: "4242".to_string(),
            },
            amount_cents: 5_000,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_release_returns_seats_and_warns() {
        let mut h = harness(10);
        let ticket_id = TicketId::new();
        let event = TicketEvent::ReleaseRequested(HoldCancellation::new(
            reservation(ticket_id, 2, "hold"),
            "hold released",
        ));

        let outcome = h.flow.ticket_flow(event, std::future::pending()).await.unwrap();

        assert_eq!(outcome, Outcome::Released);
        assert_eq!(
            drain(&mut h.toasts),
            vec![ToastOptions::new("hold released", ToastStatus::Warning)]
        );
        assert_eq!(h.gateway.available(ticket_id), 10);
        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test]
    async fn test_purchase_converts_hold_into_purchase() {
        let mut h = harness(10);
        let ticket_id = TicketId::new();
        let payload = PurchasePayload::new(
            reservation(ticket_id, 2, "hold"),
            reservation(ticket_id, 2, "purchase"),
            payment(),
        );

        let outcome = h
            .flow
            .ticket_flow(TicketEvent::PurchaseRequested(payload), std::future::pending())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Purchased);
        assert_eq!(drain(&mut h.toasts), vec![ToastOptions::purchased()]);
        assert_eq!(h.gateway.available(ticket_id), 8);
        assert_eq!(h.gateway.outstanding_holds(), 0);
        assert_eq!(h.gateway.purchases(), 1);

        let state = h.flow.state().await;
        assert_eq!(state.status, TransactionStatus::Ended);
        assert!(state.completed);
        assert!(state.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_purchase_of_the_last_held_seats() {
        let mut h = harness(2);
        let ticket_id = TicketId::new();
        let payload = PurchasePayload::new(
            reservation(ticket_id, 2, "hold"),
            reservation(ticket_id, 2, "purchase"),
            payment(),
        );

        let outcome = h
            .flow
            .ticket_flow(TicketEvent::PurchaseRequested(payload), std::future::pending())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Purchased);
        assert_eq!(drain(&mut h.toasts), vec![ToastOptions::purchased()]);
        assert_eq!(h.gateway.available(ticket_id), 0);
        assert_eq!(h.gateway.outstanding_holds(), 0);
        assert_eq!(h.gateway.purchases(), 1);
    }

    #[tokio::test]
    async fn test_pending_abort_wins_and_cleans_up() {
        let mut h = harness(10);
        let ticket_id = TicketId::new();
        let payload = PurchasePayload::new(
            reservation(ticket_id, 2, "hold"),
            reservation(ticket_id, 2, "purchase"),
            payment(),
        );
        let cancellation = payload.cancellation.clone();

        let outcome = h
            .flow
            .ticket_flow(TicketEvent::PurchaseRequested(payload), std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Aborted);
        assert!(cancellation.is_cancelled());
        assert_eq!(drain(&mut h.toasts), vec![ToastOptions::purchase_canceled()]);
        assert_eq!(h.gateway.available(ticket_id), 10);
        assert_eq!(h.gateway.outstanding_holds(), 0);
        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test]
    async fn test_rejected_hold_shows_error_tagged_hold() {
        let mut h = harness(1);
        let ticket_id = TicketId::new();
        let event = TicketEvent::AbortRequested(HoldCancellation::new(
            reservation(ticket_id, 3, "hold"),
            "never shown",
        ));

        let outcome = h.flow.ticket_flow(event, std::future::pending()).await.unwrap();

        assert_eq!(outcome, Outcome::Failed("only 1 tickets left".to_string()));
        assert_eq!(
            drain(&mut h.toasts),
            vec![generate_error_toast_options("only 1 tickets left", TicketAction::Hold)]
        );
        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test]
    async fn test_rejected_purchase_rolls_back_and_tags_purchase() {
        let mut h = harness(10);
        let ticket_id = TicketId::new();
        let payload = PurchasePayload::new(
            reservation(ticket_id, 1, "hold"),
            reservation(ticket_id, 20, "purchase"),
            payment(),
        );

        let outcome = h
            .flow
            .ticket_flow(TicketEvent::PurchaseRequested(payload), std::future::pending())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Failed("only 10 tickets left".to_string()));
        let toasts = drain(&mut h.toasts);
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].status, ToastStatus::Error);
        assert_eq!(toasts[0].ticket_action, Some(TicketAction::Purchase));
        assert_eq!(h.gateway.available(ticket_id), 10);
        assert_eq!(h.gateway.purchases(), 0);
        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test]
    async fn test_second_trigger_while_active_is_rejected() {
        let mut h = harness(10);
        h.flow.dispatch(TransactionAction::Begin).await.unwrap();

        let event = TicketEvent::ReleaseRequested(HoldCancellation::new(
            reservation(TicketId::new(), 1, "hold"),
            "late",
        ));
        let result = h.flow.ticket_flow(event, std::future::pending()).await;

        assert_eq!(result, Err(FlowError::TransactionInProgress));
        assert!(drain(&mut h.toasts).is_empty());
        assert_eq!(h.gateway.outstanding_holds(), 0);
        assert_eq!(h.flow.state().await.status, TransactionStatus::Holding);
    }

    #[tokio::test]
    async fn test_cancel_transaction_on_idle_state_is_harmless() {
        let h = harness(10);
        h.flow
            .cancel_transaction(&reservation(TicketId::new(), 1, "never-held"))
            .await
            .unwrap();
        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test]
    async fn test_cancel_transaction_recovers_abandoned_state() {
        let h = harness(10);
        h.flow.dispatch(TransactionAction::Begin).await.unwrap();

        h.flow
            .cancel_transaction(&reservation(TicketId::new(), 1, "abandoned"))
            .await
            .unwrap();

        assert_eq!(h.flow.state().await, TransactionState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clone_cannot_clean_up_or_start_while_hold_in_flight() {
        let gateway = InMemoryReservationGateway::new(GatewayConfig {
            latency_ms: 1_000,
            hold_ttl_secs: 60,
            failure_rate: 0.0,
            initial_inventory: 10,
        });
        let flow = TicketFlow::new(FlowEnvironment::new(
            Arc::new(gateway.clone()),
            Arc::new(ToastChannel::new(16)),
            Arc::new(SystemClock),
        ));
        let ticket_id = TicketId::new();
        let first = reservation(ticket_id, 2, "first");

        let running = flow.clone();
        let event = TicketEvent::ReleaseRequested(HoldCancellation::new(first.clone(), "released"));
        let transaction =
            tokio::spawn(async move { running.ticket_flow(event, std::future::pending()).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(
            flow.cancel_transaction(&first).await,
            Err(FlowError::TransactionInProgress)
        );
        let second = TicketEvent::AbortRequested(HoldCancellation::new(
            reservation(ticket_id, 1, "second"),
            "aborted",
        ));
        assert_eq!(
            flow.ticket_flow(second, std::future::pending()).await,
            Err(FlowError::TransactionInProgress)
        );
        let payload = PurchasePayload::new(
            reservation(ticket_id, 1, "third"),
            reservation(ticket_id, 1, "third-purchase"),
            payment(),
        );
        assert_eq!(
            flow.purchase_tickets(&payload, std::future::ready(())).await,
            Err(FlowError::TransactionInProgress)
        );
        assert_eq!(flow.state().await.status, TransactionStatus::Holding);

        assert_eq!(transaction.await.unwrap(), Ok(Outcome::Released));
        assert_eq!(flow.state().await, TransactionState::default());
        assert_eq!(gateway.available(ticket_id), 10);
        assert_eq!(gateway.outstanding_holds(), 0);
    }
}
