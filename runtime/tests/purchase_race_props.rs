//! Property tests for the purchase race
//!
//! Whatever the timing of the purchase answer and the abort signal, exactly
//! one terminal branch runs and the hold is released exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::time::Duration;
use ticket_flow_core::toast::ToastStatus;
use ticket_flow_core::transaction::{Outcome, TransactionState, TransactionStatus};
use ticket_flow_runtime::events::TicketEvent;
use ticket_flow_runtime::gateway::ServerError;
use ticket_flow_testing::fixtures::{self, HOLD_TOKEN, PURCHASE_TOKEN, purchase_payload};
use ticket_flow_testing::properties::{RaceSetup, arb_race_setup};
use ticket_flow_testing::{Call, Journal, MockReservationGateway, Reply};

async fn run_race(setup: RaceSetup) -> (Outcome, Journal, TransactionState) {
    let (reply, purchase_ms, abort_ms) = match setup {
        RaceSetup::Succeeds {
            purchase_ms,
            abort_ms,
        } => (Reply::Succeed, purchase_ms, abort_ms),
        RaceSetup::Fails {
            purchase_ms,
            abort_ms,
        } => (
            Reply::Fail(ServerError::Network("payment service down".to_string())),
            purchase_ms,
            abort_ms,
        ),
    };
    let gateway = MockReservationGateway::new().on_reserve_after(
        PURCHASE_TOKEN,
        reply,
        Duration::from_millis(purchase_ms),
    );
    let flow = fixtures::flow_with(&gateway);

    let abort = async move {
        match abort_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };
    let outcome = flow
        .ticket_flow(TicketEvent::PurchaseRequested(purchase_payload()), abort)
        .await
        .unwrap();

    (outcome, gateway.journal(), flow.state().await)
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_exactly_one_terminal_branch(setup in arb_race_setup()) {
        let (outcome, journal, state) = paused_runtime().block_on(run_race(setup));

        let toasts = journal.toasts();
        prop_assert_eq!(toasts.len(), 1);
        prop_assert_eq!(journal.releases_of(HOLD_TOKEN), 1);

        let rolled_back = journal
            .calls()
            .contains(&Call::CancelPurchase(PURCHASE_TOKEN.to_string()));
        prop_assert_eq!(rolled_back, outcome != Outcome::Purchased);
        prop_assert_eq!(toasts[0].status == ToastStatus::Success, outcome == Outcome::Purchased);

        if outcome == Outcome::Purchased {
            prop_assert_eq!(state.status, TransactionStatus::Ended);
        } else {
            prop_assert_eq!(state, TransactionState::default());
        }
    }

    #[test]
    fn prop_abort_wins_only_when_first(setup in arb_race_setup()) {
        let (purchase_ms, abort_ms, succeeds) = match setup {
            RaceSetup::Succeeds { purchase_ms, abort_ms } => (purchase_ms, abort_ms, true),
            RaceSetup::Fails { purchase_ms, abort_ms } => (purchase_ms, abort_ms, false),
        };
        let (outcome, _journal, _state) = paused_runtime().block_on(run_race(setup));

        match abort_ms {
            Some(abort_ms) if abort_ms < purchase_ms => {
                prop_assert_eq!(outcome, Outcome::Aborted);
            },
            Some(abort_ms) if abort_ms == purchase_ms => {
                prop_assert!(outcome.is_terminal());
            },
            _ if succeeds => prop_assert_eq!(outcome, Outcome::Purchased),
            _ => prop_assert_eq!(outcome, Outcome::Failed("payment service down".to_string())),
        }
    }
}
