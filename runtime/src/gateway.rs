//! Server gateway for the external reservation service.
//!
//! The coordinator only talks to the reservation service through
//! [`ReservationGateway`]. [`InMemoryReservationGateway`] is a development
//! implementation that keeps inventory in memory; production deployments plug
//! in an HTTP client behind the same trait.

use crate::cancellation::CancellationToken;
use crate::config::GatewayConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use ticket_flow_core::types::{HoldToken, Reservation, TicketId};

/// Gateway call result
pub type GatewayResult<T> = Result<T, ServerError>;

/// Failure of a call to the reservation service.
///
/// `Network` and `Rejected` display as the bare server message so the message
/// can be shown to the user unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Transport or availability failure
    #[error("{0}")]
    Network(String),

    /// The service refused the request
    #[error("{0}")]
    Rejected(String),

    /// The call was aborted through its cancellation token
    #[error("request cancelled")]
    Cancelled,
}

/// Reservation service abstraction.
///
/// Futures are `'static`: implementations clone what they need from the
/// arguments before returning.
pub trait ReservationGateway: Send + Sync {
    /// Place a hold (or confirm a purchase) for `request`.
    ///
    /// When `token` is given and cancelled before the server answers, the call
    /// resolves with [`ServerError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the service fails or rejects the request.
    fn reserve(
        &self,
        request: &Reservation,
        token: Option<CancellationToken>,
    ) -> BoxFuture<'static, GatewayResult<Reservation>>;

    /// Release a held reservation.
    ///
    /// Releasing a reservation that was never held must succeed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the service cannot be reached.
    fn release(&self, reservation: &Reservation) -> BoxFuture<'static, GatewayResult<()>>;

    /// Roll back a purchase attempt that was interrupted or failed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the service cannot be reached.
    fn cancel_purchase(&self, reservation: &Reservation) -> BoxFuture<'static, GatewayResult<()>>;
}

#[derive(Debug, Default)]
struct Inventory {
    available: HashMap<TicketId, u32>,
    holds: HashMap<HoldToken, Reservation>,
    purchases: HashMap<HoldToken, Reservation>,
}

/// In-memory reservation service for development.
///
/// Every ticket starts with `initial_inventory` seats. Reservations are keyed
/// by the client-chosen hold token, so reserving twice with the same token
/// returns the existing one. Releasing an unknown token is a no-op.
///
/// A `reserve` call carrying a cancellation token is a purchase. It converts
/// seats held for the same ticket first and only takes fresh inventory for
/// the rest, so a user can buy exactly the seats they hold. Purchases are kept
/// apart from holds; `release` never touches them.
#[derive(Clone, Debug)]
pub struct InMemoryReservationGateway {
    config: GatewayConfig,
    inventory: Arc<Mutex<Inventory>>,
}

impl InMemoryReservationGateway {
    /// Creates a gateway with the given settings
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            inventory: Arc::new(Mutex::new(Inventory::default())),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(config: GatewayConfig) -> Arc<dyn ReservationGateway> {
        Arc::new(Self::new(config))
    }

    /// Seats still available for `ticket_id`.
    #[must_use]
    pub fn available(&self, ticket_id: TicketId) -> u32 {
        let inventory = self.inventory.lock().unwrap_or_else(PoisonError::into_inner);
        inventory
            .available
            .get(&ticket_id)
            .copied()
            .unwrap_or(self.config.initial_inventory)
    }

    /// Number of holds currently outstanding.
    #[must_use]
    pub fn outstanding_holds(&self) -> usize {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .holds
            .len()
    }

    /// Number of confirmed purchases.
    #[must_use]
    pub fn purchases(&self) -> usize {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .purchases
            .len()
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.config.latency_ms)
    }

    fn should_fail(&self) -> bool {
        self.config.failure_rate > 0.0
            && rand::thread_rng().gen_bool(self.config.failure_rate.clamp(0.0, 1.0))
    }

    fn hold_expiry(&self) -> DateTime<Utc> {
        i64::try_from(self.config.hold_ttl_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn place_hold(&self, request: &Reservation) -> GatewayResult<Reservation> {
        let mut inventory = self.inventory.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inventory.holds.get(request.hold_token()) {
            return Ok(existing.clone());
        }

        let initial = self.config.initial_inventory;
        let available = inventory
            .available
            .entry(request.ticket_id())
            .or_insert(initial);
        if *available < request.quantity() {
            return Err(ServerError::Rejected(format!(
                "only {available} tickets left"
            )));
        }
        *available -= request.quantity();

        let confirmed = Reservation::new(
            request.ticket_id(),
            request.quantity(),
            request.hold_token().clone(),
            self.hold_expiry(),
        );
        inventory
            .holds
            .insert(confirmed.hold_token().clone(), confirmed.clone());

        Ok(confirmed)
    }

    fn place_purchase(&self, request: &Reservation) -> GatewayResult<Reservation> {
        let mut inventory = self.inventory.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inventory.purchases.get(request.hold_token()) {
            return Ok(existing.clone());
        }

        let ticket_id = request.ticket_id();
        let initial = self.config.initial_inventory;
        let available = inventory.available.get(&ticket_id).copied().unwrap_or(initial);
        let held: u32 = inventory
            .holds
            .values()
            .filter(|hold| hold.ticket_id() == ticket_id)
            .map(Reservation::quantity)
            .sum();
        let sellable = available.saturating_add(held);
        if sellable < request.quantity() {
            return Err(ServerError::Rejected(format!(
                "only {sellable} tickets left"
            )));
        }

        let mut remaining = request.quantity();
        let converted: Vec<HoldToken> = inventory
            .holds
            .values()
            .filter(|hold| hold.ticket_id() == ticket_id)
            .map(|hold| hold.hold_token().clone())
            .collect();
        for token in converted {
            if remaining == 0 {
                break;
            }
            let Some(hold) = inventory.holds.remove(&token) else {
                continue;
            };
            let taken = hold.quantity().min(remaining);
            remaining -= taken;
            if taken < hold.quantity() {
                let rest = Reservation::new(
                    ticket_id,
                    hold.quantity() - taken,
                    token.clone(),
                    hold.expires_at(),
                );
                inventory.holds.insert(token, rest);
            }
        }
        *inventory.available.entry(ticket_id).or_insert(initial) -= remaining;

        inventory
            .purchases
            .insert(request.hold_token().clone(), request.clone());
        Ok(request.clone())
    }

    fn drop_hold(&self, reservation: &Reservation) -> bool {
        let mut inventory = self.inventory.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(held) = inventory.holds.remove(reservation.hold_token()) else {
            return false;
        };
        let initial = self.config.initial_inventory;
        *inventory.available.entry(held.ticket_id()).or_insert(initial) += held.quantity();
        true
    }

    fn drop_purchase(&self, reservation: &Reservation) -> bool {
        let mut inventory = self.inventory.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bought) = inventory.purchases.remove(reservation.hold_token()) else {
            return false;
        };
        let initial = self.config.initial_inventory;
        *inventory.available.entry(bought.ticket_id()).or_insert(initial) += bought.quantity();
        true
    }
}

impl ReservationGateway for InMemoryReservationGateway {
    fn reserve(
        &self,
        request: &Reservation,
        token: Option<CancellationToken>,
    ) -> BoxFuture<'static, GatewayResult<Reservation>> {
        let gateway = self.clone();
        let request = request.clone();
        Box::pin(async move {
            let is_purchase = token.is_some();
            let cancelled = async {
                match &token {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = cancelled => {
                    tracing::debug!(ticket_id = %request.ticket_id(), "Reserve call cancelled");
                    Err(ServerError::Cancelled)
                }
                () = tokio::time::sleep(gateway.latency()) => {
                    if gateway.should_fail() {
                        return Err(ServerError::Network(
                            "reservation service unavailable".to_string(),
                        ));
                    }
                    let confirmed = if is_purchase {
                        gateway.place_purchase(&request)?
                    } else {
                        gateway.place_hold(&request)?
                    };
                    tracing::info!(
                        ticket_id = %confirmed.ticket_id(),
                        quantity = confirmed.quantity(),
                        hold_token = %confirmed.hold_token(),
                        purchase = is_purchase,
                        "Reservation confirmed"
                    );
                    Ok(confirmed)
                }
            }
        })
    }

    fn release(&self, reservation: &Reservation) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        let reservation = reservation.clone();
        Box::pin(async move {
            tokio::time::sleep(gateway.latency()).await;
            let released = gateway.drop_hold(&reservation);
            tracing::info!(
                hold_token = %reservation.hold_token(),
                released,
                "Release processed"
            );
            Ok(())
        })
    }

    fn cancel_purchase(&self, reservation: &Reservation) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        let reservation = reservation.clone();
        Box::pin(async move {
            tokio::time::sleep(gateway.latency()).await;
            let rolled_back = gateway.drop_purchase(&reservation);
            tracing::info!(
                hold_token = %reservation.hold_token(),
                rolled_back,
                "Purchase rollback processed"
            );
            Ok(())
        })
    }
}
