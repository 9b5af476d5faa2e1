//! Command loop driving a [`TicketFlow`] from a background task.
//!
//! The loop runs one transaction at a time. While a purchase is in flight it
//! also listens for [`FlowCommand::AbortPurchase`], which is the abort signal
//! raced against the purchase call. Once a transaction settles the loop goes
//! back to waiting for the next trigger.

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::events::{PurchasePayload, TicketEvent};
use crate::flow::TicketFlow;
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ticket_flow_core::transaction::{Outcome, TransactionState};
use ticket_flow_core::types::HoldCancellation;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Commands accepted by the loop.
#[derive(Debug)]
pub enum FlowCommand {
    /// Start a transaction and report its outcome on `reply`
    Start {
        /// Trigger event
        event: TicketEvent,
        /// Receives the terminal outcome
        reply: oneshot::Sender<Result<Outcome, FlowError>>,
    },
    /// Abort the purchase in flight, if any
    AbortPurchase,
}

/// A started transaction whose outcome has not been collected yet.
#[derive(Debug)]
pub struct PendingTransaction {
    outcome: oneshot::Receiver<Result<Outcome, FlowError>>,
}

impl PendingTransaction {
    /// Wait for the transaction to settle.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Closed`] if the loop stopped before replying.
    pub async fn outcome(self) -> Result<Outcome, FlowError> {
        self.outcome.await.map_err(|_| FlowError::Closed)?
    }
}

/// Cloneable handle to a running ticket flow.
#[derive(Clone, Debug)]
pub struct TicketFlowHandle {
    commands: mpsc::Sender<FlowCommand>,
    busy: Arc<AtomicBool>,
    state: Arc<RwLock<TransactionState>>,
}

impl TicketFlowHandle {
    /// Start a transaction for `event`.
    ///
    /// # Errors
    ///
    /// - [`FlowError::TransactionInProgress`] if a transaction is active
    /// - [`FlowError::Closed`] if the loop is no longer running
    pub async fn start(&self, event: TicketEvent) -> Result<PendingTransaction, FlowError> {
        // Nothing is marked busy until the command is guaranteed to be delivered.
        let permit = self
            .commands
            .reserve()
            .await
            .map_err(|_| FlowError::Closed)?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(
                action = %event.ticket_action(),
                "Transaction already active, trigger rejected"
            );
            counter!("ticket_flow_commands_rejected_total").increment(1);
            return Err(FlowError::TransactionInProgress);
        }

        let (reply, outcome) = oneshot::channel();
        permit.send(FlowCommand::Start { event, reply });

        Ok(PendingTransaction { outcome })
    }

    /// Hold the tickets, then release them with a warning toast.
    ///
    /// # Errors
    ///
    /// See [`TicketFlowHandle::start`].
    pub async fn release(
        &self,
        cancellation: HoldCancellation,
    ) -> Result<PendingTransaction, FlowError> {
        self.start(TicketEvent::ReleaseRequested(cancellation)).await
    }

    /// Hold the tickets, then abort with a warning toast.
    ///
    /// # Errors
    ///
    /// See [`TicketFlowHandle::start`].
    pub async fn abort(
        &self,
        cancellation: HoldCancellation,
    ) -> Result<PendingTransaction, FlowError> {
        self.start(TicketEvent::AbortRequested(cancellation)).await
    }

    /// Hold the tickets, then purchase them.
    ///
    /// # Errors
    ///
    /// See [`TicketFlowHandle::start`].
    pub async fn purchase(
        &self,
        payload: PurchasePayload,
    ) -> Result<PendingTransaction, FlowError> {
        self.start(TicketEvent::PurchaseRequested(payload)).await
    }

    /// Signal an abort to the purchase in flight.
    ///
    /// Ignored when no purchase is racing.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Closed`] if the loop is no longer running.
    pub async fn abort_purchase(&self) -> Result<(), FlowError> {
        self.commands
            .send(FlowCommand::AbortPurchase)
            .await
            .map_err(|_| FlowError::Closed)
    }

    /// Snapshot of the transaction state.
    pub async fn state(&self) -> TransactionState {
        self.state.read().await.clone()
    }

    /// Whether a transaction has been started and not yet settled.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl TicketFlow {
    /// Move the coordinator onto a background task.
    ///
    /// The task stops once every handle is dropped.
    #[must_use]
    pub fn spawn(self, config: &FlowConfig) -> (TicketFlowHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(config.command_buffer.max(1));
        let busy = Arc::new(AtomicBool::new(false));
        let handle = TicketFlowHandle {
            commands,
            busy: Arc::clone(&busy),
            state: self.shared_state(),
        };

        let task = tokio::spawn(self.run(receiver, busy));
        (handle, task)
    }

    async fn run(self, mut commands: mpsc::Receiver<FlowCommand>, busy: Arc<AtomicBool>) {
        tracing::info!("Ticket flow started");

        while let Some(command) = commands.recv().await {
            match command {
                FlowCommand::AbortPurchase => {
                    tracing::debug!("No purchase in flight, abort ignored");
                },
                FlowCommand::Start { event, reply } => {
                    let result = self.ticket_flow(event, next_abort(&mut commands)).await;
                    busy.store(false, Ordering::Release);
                    if reply.send(result).is_err() {
                        tracing::debug!("Outcome dropped, caller went away");
                    }
                },
            }
        }

        tracing::info!("Ticket flow stopped");
    }
}

/// Resolves on the next abort command. Never resolves once every handle is gone.
async fn next_abort(commands: &mut mpsc::Receiver<FlowCommand>) {
    loop {
        match commands.recv().await {
            Some(FlowCommand::AbortPurchase) => return,
            Some(FlowCommand::Start { event, reply }) => {
                tracing::warn!(
                    action = %event.ticket_action(),
                    "Transaction already active, trigger rejected"
                );
                counter!("ticket_flow_commands_rejected_total").increment(1);
                let _ = reply.send(Err(FlowError::TransactionInProgress));
            },
            None => std::future::pending::<()>().await,
        }
    }
}
