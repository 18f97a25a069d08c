use crate::invariants::{
    assert_all_project_invariants, assert_award_stable, assert_balance_non_negative,
    assert_project_immutable_fields, assert_reconciled,
};
use crate::testutil::{ratings, Harness};
use crate::types::{FeeSchedule, ProjectStatus, ReviewStatus, TransactionKind};
use crate::{MarketError, NotificationKind, StoreError};

#[tokio::test]
async fn full_project_round_trip_with_fees() {
    let h = Harness::with_fees(FeeSchedule {
        posting_fee: 20,
        bid_fee: 5,
    })
    .await;
    let customer = h.customer_with(50).await;
    let alice = h.verified_supplier_with(10).await;
    let bob = h.verified_supplier_with(10).await;

    let created = h
        .market
        .create_project(customer, "Replace boiler", "Gas combi, two floors", 2_000)
        .await
        .unwrap();
    let bid_a = h.market.place_bid(created.id, alice, 1_800, "Next week").await.unwrap();
    h.market.place_bid(created.id, bob, 1_700, "Tomorrow").await.unwrap();

    let awarded = h.market.accept_bid(created.id, bid_a.id, customer).await.unwrap();
    assert_project_immutable_fields(&created, &awarded);
    assert_all_project_invariants(&awarded);

    h.market.send_message(customer, alice, "Gate code is 1234").await.unwrap();
    let err = h.market.send_message(customer, bob, "hi").await.unwrap_err();
    assert!(matches!(err, MarketError::CommunicationNotAuthorized { .. }));

    let completed = h.market.mark_complete(created.id, alice).await.unwrap();
    assert_award_stable(&awarded, &completed);
    assert_eq!(completed.status, ProjectStatus::Completed);

    let review = h
        .market
        .submit_review(created.id, customer, ratings(5), "Warm again")
        .await
        .unwrap();
    h.market
        .set_review_status(review.id, ReviewStatus::Approved, h.admin)
        .await
        .unwrap();
    assert_eq!(h.market.supplier_rating(alice).await.unwrap().average, Some(5.0));

    for user_id in [customer, alice, bob] {
        let user = h.user(user_id).await;
        assert_balance_non_negative(&user);
        assert_reconciled(&user, &h.market.transactions(user_id).await.unwrap());
    }
    assert_eq!(h.user(customer).await.wallet_balance, 30);
    assert_eq!(h.user(alice).await.bid_balance, 5);
    assert_eq!(h.user(bob).await.bid_balance, 5);

    let details = h.market.project_details(created.id).await.unwrap();
    assert_eq!(details.bids.len(), 2);
    assert_eq!(details.review.map(|r| r.status), Some(ReviewStatus::Approved));
}

#[tokio::test]
async fn blocked_customer_cannot_post() {
    let h = Harness::new().await;
    let customer = h.customer_with(0).await;
    h.market
        .set_account_status(h.admin, customer, crate::AccountStatus::Blocked)
        .await
        .unwrap();
    let err = h
        .market
        .create_project(customer, "t", "", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AccountNotEligible(_)));
}

#[tokio::test]
async fn removing_a_customer_cascades_to_projects_and_bids() {
    let h = Harness::new().await;
    let (customer, project) = h.open_project(100).await;
    let supplier = h.verified_supplier_with(0).await;
    let bid = h.market.place_bid(project, supplier, 90, "").await.unwrap();

    h.market.remove_user(h.admin, customer).await.unwrap();

    assert!(matches!(
        h.market.project(project).await.unwrap_err(),
        MarketError::NotFound { .. }
    ));
    assert!(matches!(
        h.market.bid(bid.id).await.unwrap_err(),
        MarketError::NotFound { .. }
    ));
}

#[tokio::test]
async fn removing_a_supplier_keeps_awards_intact() {
    let h = Harness::new().await;
    let (customer, supplier, project) = h.awarded_project().await;
    let (_, open) = h.open_project(100).await;
    let pending_bid = h.market.place_bid(open, supplier, 90, "").await.unwrap();

    h.market.remove_user(h.admin, supplier).await.unwrap();

    let awarded = h.market.project(project).await.unwrap();
    assert_eq!(awarded.status, ProjectStatus::Awarded);
    assert_eq!(awarded.awarded_supplier(), Some(supplier));
    assert_eq!(awarded.customer_id, customer);
    let award_bid = awarded.award.unwrap().bid_id;
    assert!(h.market.bid(award_bid).await.is_ok());
    assert!(h.market.bid(pending_bid.id).await.is_err());
}

#[tokio::test]
async fn refund_kind_is_recorded_for_credits() {
    let h = Harness::new().await;
    let customer = h.customer_with(10).await;
    let tx = h
        .market
        .credit(customer, 4, TransactionKind::Refund, "manual")
        .await
        .unwrap();
    assert_eq!((tx.kind, tx.amount), (TransactionKind::Refund, 4));
    assert_eq!(h.user(customer).await.wallet_balance, 14);
}

#[tokio::test]
async fn failed_project_insert_refunds_the_posting_fee() {
    let h = Harness::with_fees(FeeSchedule {
        posting_fee: 20,
        bid_fee: 0,
    })
    .await;
    let (market, store) = h.proxied();
    let customer = h.customer_with(50).await;
    store.fail_on("insert_project");

    let err = market
        .create_project(customer, "Fix roof", "", 100)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Store(StoreError::Unavailable(_))));
    assert!(h.market.projects_for_user(customer).await.unwrap().is_empty());

    let user = h.user(customer).await;
    assert_eq!(user.wallet_balance, 50);
    let history = h.market.transactions(customer).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|t| (t.kind, t.amount)).collect();
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[(TransactionKind::ProjectFee, -20), (TransactionKind::Refund, 20)]
    );
    assert_reconciled(&user, &history);
}

#[tokio::test]
async fn failed_bid_insert_refunds_the_bid_fee() {
    let h = Harness::with_fees(FeeSchedule {
        posting_fee: 0,
        bid_fee: 10,
    })
    .await;
    let (market, store) = h.proxied();
    let (_, project) = h.open_project(100).await;
    let supplier = h.verified_supplier_with(25).await;
    store.fail_on("insert_bid");

    let err = market.place_bid(project, supplier, 90, "").await.unwrap_err();
    assert!(matches!(err, MarketError::Store(StoreError::Unavailable(_))));
    assert!(h.market.bids_for_project(project).await.unwrap().is_empty());

    let user = h.user(supplier).await;
    assert_eq!(user.bid_balance, 25);
    let history = h.market.transactions(supplier).await.unwrap();
    assert_eq!(history.last().map(|t| t.kind), Some(TransactionKind::Refund));
    assert_reconciled(&user, &history);
}

#[tokio::test]
async fn committed_award_survives_a_failed_bid_listing() {
    let h = Harness::new().await;
    let (market, store) = h.proxied();
    let (customer, project) = h.open_project(100).await;
    let winner = h.verified_supplier_with(0).await;
    let other = h.verified_supplier_with(0).await;
    let bid = h.market.place_bid(project, winner, 90, "").await.unwrap();
    h.market.place_bid(project, other, 80, "").await.unwrap();
    store.fail_on("bids_for_project");

    let awarded = market.accept_bid(project, bid.id, customer).await.unwrap();
    assert_eq!(awarded.status, ProjectStatus::Awarded);
    assert_eq!(awarded.awarded_supplier(), Some(winner));
    assert_eq!(h.market.project(project).await.unwrap(), awarded);

    assert!(h.notifier.kinds_for(winner).contains(&NotificationKind::BidAccepted));
    assert!(!h.notifier.kinds_for(other).contains(&NotificationKind::BidDeclined));
}
