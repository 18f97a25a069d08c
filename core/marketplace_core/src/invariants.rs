#![allow(dead_code)]

use std::collections::HashSet;

use crate::types::{Bid, BalancePool, Project, ProjectStatus, Transaction, User};

/// INV-1: No balance pool is ever negative.
pub fn assert_balance_non_negative(user: &User) {
    assert!(
        user.wallet_balance >= 0,
        "INV-1 violated: user {} has negative wallet balance ({})",
        user.id,
        user.wallet_balance
    );
    assert!(
        user.bid_balance >= 0,
        "INV-1 violated: user {} has negative bid balance ({})",
        user.id,
        user.bid_balance
    );
}

/// INV-2: The active pool equals the sum of the user's ledger history.
/// Users start at zero, so there is no opening balance to add.
pub fn assert_reconciled(user: &User, history: &[Transaction]) {
    let sum: i64 = history
        .iter()
        .filter(|t| t.user_id == user.id)
        .map(|t| t.amount)
        .sum();
    let balance = BalancePool::for_role(user.role)
        .map(|pool| user.balance(pool))
        .unwrap_or(0);
    assert_eq!(
        balance, sum,
        "INV-2 violated: user {} balance {} != ledger sum {}",
        user.id, balance, sum
    );
}

/// INV-3: The award is absent while open and present once awarded or completed.
pub fn assert_award_consistent(project: &Project) {
    match project.status {
        ProjectStatus::Open => assert!(
            project.award.is_none(),
            "INV-3 violated: open project {} carries an award",
            project.id
        ),
        ProjectStatus::Awarded | ProjectStatus::Completed => assert!(
            project.award.is_some(),
            "INV-3 violated: project {} is {} without an award",
            project.id,
            project.status
        ),
        ProjectStatus::Cancelled => {}
    }
}

/// INV-4: Status transition validity. Only forward transitions are allowed:
///   Open    -> Awarded | Cancelled
///   Awarded -> Completed
///   Completed, Cancelled -> (none)
pub fn assert_valid_status_transition(from: &ProjectStatus, to: &ProjectStatus) {
    assert!(
        from.can_transition_to(*to),
        "INV-4 violated: invalid status transition from {:?} to {:?}",
        from,
        to
    );
}

/// INV-5: At most one bid per supplier per project.
pub fn assert_bids_unique(bids: &[Bid]) {
    let mut seen = HashSet::new();
    for bid in bids {
        assert!(
            seen.insert((bid.project_id, bid.supplier_id)),
            "INV-5 violated: supplier {} has two bids on project {}",
            bid.supplier_id,
            bid.project_id
        );
    }
}

/// INV-6: Fields fixed at creation never change.
pub fn assert_project_immutable_fields(original: &Project, current: &Project) {
    assert_eq!(original.id, current.id, "INV-6 violated: project id changed");
    assert_eq!(
        original.customer_id, current.customer_id,
        "INV-6 violated: project owner changed"
    );
    assert_eq!(
        original.budget, current.budget,
        "INV-6 violated: project budget changed"
    );
}

/// INV-7: Once set, the award never changes.
pub fn assert_award_stable(before: &Project, after: &Project) {
    if before.award.is_some() {
        assert_eq!(
            before.award, after.award,
            "INV-7 violated: award of project {} was reassigned",
            before.id
        );
    }
}

/// Run all stateless project invariants.
pub fn assert_all_project_invariants(project: &Project) {
    assert_award_consistent(project);
    assert!(
        project.budget > 0,
        "project {} has non-positive budget ({})",
        project.id,
        project.budget
    );
}
