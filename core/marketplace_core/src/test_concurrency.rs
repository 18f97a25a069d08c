//! Races that the conditional writes must decide.
//!
//! The racing marketplace reaches the store through `YieldingStore`, which
//! hands control back to the scheduler before every call, so futures joined on
//! one task interleave between their read and their write. That is the window
//! a remote store leaves open.

use crate::errors::{MarketError, StoreError};
use crate::invariants::{assert_balance_non_negative, assert_reconciled};
use crate::testutil::Harness;
use crate::types::*;
use crate::Marketplace;

async fn racing(fees: FeeSchedule) -> (Harness, Marketplace) {
    let h = Harness::with_fees(fees).await;
    let (market, _) = h.proxied();
    (h, market)
}

#[tokio::test]
async fn concurrent_accepts_award_exactly_once() {
    let (h, market) = racing(FeeSchedule::default()).await;
    let (customer, project) = h.open_project(1_000).await;
    let a = h.verified_supplier_with(0).await;
    let b = h.verified_supplier_with(0).await;
    let bid_a = h.market.place_bid(project, a, 900, "").await.unwrap();
    let bid_b = h.market.place_bid(project, b, 800, "").await.unwrap();

    let (first, second) = tokio::join!(
        market.accept_bid(project, bid_a.id, customer),
        market.accept_bid(project, bid_b.id, customer),
    );

    let outcomes = [first, second];
    let wins: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(wins.len(), 1, "exactly one accept must succeed");
    for loss in outcomes.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(loss, MarketError::InvalidStateTransition(_)));
    }

    let stored = h.market.project(project).await.unwrap();
    assert_eq!(stored.status, ProjectStatus::Awarded);
    assert_eq!(stored.award, wins[0].award);
}

#[tokio::test]
async fn first_accept_wins_and_is_never_overwritten() {
    let (h, market) = racing(FeeSchedule::default()).await;
    let (customer, project) = h.open_project(1_000).await;
    let a = h.verified_supplier_with(0).await;
    let b = h.verified_supplier_with(0).await;
    let bid_a = h.market.place_bid(project, a, 900, "").await.unwrap();
    let bid_b = h.market.place_bid(project, b, 800, "").await.unwrap();

    market.accept_bid(project, bid_a.id, customer).await.unwrap();
    let err = market.accept_bid(project, bid_b.id, customer).await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidStateTransition(_)));
    assert_eq!(
        h.market.project(project).await.unwrap().awarded_supplier(),
        Some(a)
    );
}

#[tokio::test]
async fn concurrent_fee_debits_never_overdraw() {
    let (h, market) = racing(FeeSchedule::default()).await;
    let customer = h.customer_with(50).await;

    let debit = |n: i64| {
        let market = market.clone();
        async move {
            market
                .debit(customer, 10, TransactionKind::ProjectFee, format!("fee {n}"))
                .await
        }
    };
    let results = tokio::join!(
        debit(1),
        debit(2),
        debit(3),
        debit(4),
        debit(5),
        debit(6),
        debit(7),
        debit(8)
    );
    let results = [
        results.0, results.1, results.2, results.3, results.4, results.5, results.6, results.7,
    ];

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as i64;
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err,
            MarketError::InsufficientBalance { .. } | MarketError::Store(StoreError::Conflict(_))
        ));
    }

    let user = h.user(customer).await;
    assert!(succeeded <= 5);
    assert_eq!(user.wallet_balance, 50 - 10 * succeeded);
    assert_balance_non_negative(&user);
    assert_reconciled(&user, &h.market.transactions(customer).await.unwrap());
}

#[tokio::test]
async fn concurrent_duplicate_bids_leave_one_bid_and_one_fee() {
    let fees = FeeSchedule {
        posting_fee: 0,
        bid_fee: 10,
    };
    let (h, market) = racing(fees).await;
    let (_, project) = h.open_project(1_000).await;
    let supplier = h.verified_supplier_with(100).await;

    let (first, second) = tokio::join!(
        market.place_bid(project, supplier, 900, "one"),
        market.place_bid(project, supplier, 850, "two"),
    );
    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);

    let bids = h.market.bids_for_project(project).await.unwrap();
    assert_eq!(bids.len(), 1);

    // A loser that got past the pre-check paid and was refunded.
    let user = h.user(supplier).await;
    assert_eq!(user.bid_balance, 90);
    assert_reconciled(&user, &h.market.transactions(supplier).await.unwrap());
}

#[tokio::test]
async fn delete_and_accept_race_leaves_one_outcome() {
    let (h, market) = racing(FeeSchedule::default()).await;
    let (customer, project) = h.open_project(1_000).await;
    let supplier = h.verified_supplier_with(0).await;
    let bid = h.market.place_bid(project, supplier, 900, "").await.unwrap();

    let (deleted, accepted) = tokio::join!(
        market.delete_project(project, customer),
        market.accept_bid(project, bid.id, customer),
    );
    assert_ne!(deleted.is_ok(), accepted.is_ok());

    match h.market.project(project).await {
        Ok(p) => {
            assert!(accepted.is_ok());
            assert_eq!(p.status, ProjectStatus::Awarded);
        }
        Err(MarketError::NotFound { .. }) => assert!(deleted.is_ok()),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn bid_racing_an_award_never_lands_on_the_awarded_project() {
    let fees = FeeSchedule {
        posting_fee: 0,
        bid_fee: 10,
    };
    let (h, market) = racing(fees).await;
    let (customer, project) = h.open_project(1_000).await;
    let first = h.verified_supplier_with(10).await;
    let late = h.verified_supplier_with(10).await;
    let winning = h.market.place_bid(project, first, 900, "").await.unwrap();

    let (accepted, placed) = tokio::join!(
        market.accept_bid(project, winning.id, customer),
        market.place_bid(project, late, 800, "late"),
    );
    let awarded = accepted.unwrap();
    assert_eq!(awarded.status, ProjectStatus::Awarded);

    let bids = h.market.bids_for_project(project).await.unwrap();
    let user = h.user(late).await;
    match placed {
        // Landed while the project was still open: the fee stays spent.
        Ok(bid) => {
            assert!(bids.iter().any(|b| b.id == bid.id));
            assert_eq!(user.bid_balance, 0);
        }
        Err(err) => {
            assert!(matches!(err, MarketError::InvalidStateTransition(_)));
            assert!(bids.iter().all(|b| b.supplier_id != late));
            assert_eq!(user.bid_balance, 10);
        }
    }
    assert_reconciled(&user, &h.market.transactions(late).await.unwrap());
    assert_eq!(
        h.market.project(project).await.unwrap().awarded_supplier(),
        Some(first)
    );
}

#[tokio::test]
async fn bid_insert_rechecks_status_after_the_fee() {
    let fees = FeeSchedule {
        posting_fee: 0,
        bid_fee: 10,
    };
    let h = Harness::with_fees(fees).await;
    let (market, store) = h.proxied();
    let (customer, project) = h.open_project(1_000).await;
    let first = h.verified_supplier_with(10).await;
    let late = h.verified_supplier_with(10).await;
    let winning = h.market.place_bid(project, first, 900, "").await.unwrap();

    // The award commits between the late bidder's checks and its insert.
    let award_market = h.market.clone();
    store.before_call("insert_bid", move || async move {
        award_market
            .accept_bid(project, winning.id, customer)
            .await
            .unwrap();
    });

    let err = market.place_bid(project, late, 800, "late").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidStateTransition(_)));

    let user = h.user(late).await;
    assert_eq!(user.bid_balance, 10);
    let history = h.market.transactions(late).await.unwrap();
    assert_eq!(
        history.last().map(|t| t.kind),
        Some(TransactionKind::Refund)
    );
    assert_reconciled(&user, &history);
    assert_eq!(h.market.bids_for_project(project).await.unwrap().len(), 1);
}
