//! Ticket Flow Demo
//!
//! Walks through every branch of a ticket transaction against the in-memory
//! reservation service:
//! - Hold then release
//! - Hold then abort
//! - Hold then purchase
//! - Hold then purchase, aborted while the purchase call is in flight
//! - Hold rejected because the ticket is sold out
//!
//! Toasts are printed as JSON; error toasts are also reported through the
//! analytics forwarder.
//!
//! # Usage
//!
//! ```bash
//! GATEWAY_LATENCY_MS=200 cargo run --bin demo
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use ticket_flow_core::environment::SystemClock;
use ticket_flow_core::types::{
    HoldCancellation, HoldToken, PaymentDetails, PaymentMethod, Reservation, TicketId,
};
use ticket_flow_runtime::metrics::MetricsRecorder;
use ticket_flow_runtime::{
    Config, ErrorToastForwarder, FlowEnvironment, InMemoryReservationGateway, PurchasePayload,
    TicketFlow, TicketFlowHandle, ToastChannel, TracingAnalyticsSink,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("{},ticket_flow_runtime=debug", config.log_level).into()
                }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let metrics = MetricsRecorder::install()?;

    println!("\n🎫 ============================================");
    println!("   Ticket Flow - Live Demo");
    println!("============================================\n");

    let gateway = InMemoryReservationGateway::new(config.gateway.clone());
    let toasts = ToastChannel::new(config.flow.toast_capacity);
    let forwarder = ErrorToastForwarder::spawn(&toasts, Arc::new(TracingAnalyticsSink));
    let printer = spawn_toast_printer(&toasts);

    let flow = TicketFlow::new(FlowEnvironment::new(
        Arc::new(gateway.clone()),
        Arc::new(toasts),
        Arc::new(SystemClock),
    ));
    let (handle, task) = flow.spawn(&config.flow);

    let ticket_id = TicketId::new();
    let latency = Duration::from_millis(config.gateway.latency_ms);

    // ========== Release ==========
    println!("📋 Hold two seats, then release them");
    let pending = handle
        .release(HoldCancellation::new(
            request(ticket_id, 2, "release-hold"),
            "Seats released",
        ))
        .await?;
    report(&gateway, ticket_id, pending.outcome().await?);

    // ========== Abort ==========
    println!("📋 Hold two seats, then abort");
    let pending = handle
        .abort(HoldCancellation::new(
            request(ticket_id, 2, "abort-hold"),
            "Checkout abandoned",
        ))
        .await?;
    report(&gateway, ticket_id, pending.outcome().await?);

    // ========== Purchase ==========
    println!("📋 Hold two seats, then purchase them");
    let pending = handle
        .purchase(PurchasePayload::new(
            request(ticket_id, 2, "purchase-hold"),
            request(ticket_id, 2, "purchase-1"),
            card_payment(),
        ))
        .await?;
    report(&gateway, ticket_id, pending.outcome().await?);

    // ========== Purchase aborted ==========
    println!("📋 Hold two seats, purchase, and abort while the purchase is in flight");
    let pending = handle
        .purchase(PurchasePayload::new(
            request(ticket_id, 2, "aborted-hold"),
            request(ticket_id, 2, "aborted-purchase"),
            card_payment(),
        ))
        .await?;
    tokio::time::sleep(latency + latency / 2).await;
    handle.abort_purchase().await?;
    report(&gateway, ticket_id, pending.outcome().await?);

    // ========== Sold out ==========
    let too_many = config.gateway.initial_inventory.saturating_add(1);
    println!("📋 Try to hold {too_many} seats");
    let pending = handle
        .release(HoldCancellation::new(
            request(ticket_id, too_many, "greedy-hold"),
            "never shown",
        ))
        .await?;
    report(&gateway, ticket_id, pending.outcome().await?);

    shutdown(handle, task).await;
    printer.await?;
    let forwarded = forwarder.join().await;

    println!("\n✓ Demo complete ({forwarded} error toasts forwarded to analytics)");
    if let Some(rendered) = metrics.render() {
        println!("\n📈 Metrics\n{rendered}");
    }

    Ok(())
}

fn request(ticket_id: TicketId, quantity: u32, token: &str) -> Reservation {
    Reservation::new(
        ticket_id,
        quantity,
        HoldToken::new(token),
        Utc::now() + ChronoDuration::minutes(5),
    )
}

fn card_payment() -> PaymentDetails {
    PaymentDetails {
        method: PaymentMethod::CreditCard {
            last_four: "4242".to_string(),
        },
        amount_cents: 12_000,
        currency: "USD".to_string(),
    }
}

fn report(
    gateway: &InMemoryReservationGateway,
    ticket_id: TicketId,
    outcome: ticket_flow_core::transaction::Outcome,
) {
    println!(
        "   → {outcome} ({} seats available, {} holds outstanding, {} purchases)\n",
        gateway.available(ticket_id),
        gateway.outstanding_holds(),
        gateway.purchases()
    );
}

fn spawn_toast_printer(toasts: &ToastChannel) -> tokio::task::JoinHandle<()> {
    let mut receiver = toasts.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(toast) => match serde_json::to_string(&toast) {
                    Ok(json) => println!("   🔔 {json}"),
                    Err(error) => tracing::warn!(%error, "Failed to encode toast"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Toast printer lagged");
                },
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn shutdown(handle: TicketFlowHandle, task: tokio::task::JoinHandle<()>) {
    drop(handle);
    if let Err(error) = task.await {
        tracing::error!(%error, "Ticket flow task failed");
    }
}
