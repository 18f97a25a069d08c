//! # Storage
//!
//! The persistence boundary of the core. [`Store`] is the repository port every
//! component reads and writes through; the core never keeps its own copy of a
//! record between operations.
//!
//! ## Conditional writes
//!
//! The backend offers no multi-call transactions, so the two races the core
//! must win are decided by single conditional writes:
//!
//! | Write                  | Precondition                        | Lost race  |
//! |------------------------|-------------------------------------|------------|
//! | `commit_ledger_entry`  | pool balance == `expected_balance`  | `Ok(None)` |
//! | `award_if_open`        | `status == open`                    | `Ok(false)`|
//! | `transition_status`    | `status == from`                    | `Ok(false)`|
//!
//! Uniqueness (one bid per supplier per project, one review per project) is a
//! store constraint surfaced as [`StoreError::Conflict`].

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::types::{
    AccountStatus, Amount, Award, BalancePool, Bid, Id, Message, NewBid, NewMessage, NewProject,
    NewReview, NewTransaction, NewUser, Project, ProjectStatus, Review, ReviewStatus, Timestamp,
    Transaction, User, VerificationStatus,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // ── Users ────────────────────────────────────────────────────────

    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn user(&self, id: Id) -> StoreResult<Option<User>>;

    async fn users(&self) -> StoreResult<Vec<User>>;

    /// Update the status flags. Balances are not writable here.
    async fn update_user_status(
        &self,
        id: Id,
        account_status: AccountStatus,
        verification_status: VerificationStatus,
    ) -> StoreResult<bool>;

    /// Remove a user together with the projects they own (and those projects'
    /// bids and reviews), their bids that no award references, and their
    /// ledger history.
    async fn delete_user(&self, id: Id) -> StoreResult<bool>;

    // ── Ledger ───────────────────────────────────────────────────────

    /// Set `pool` to `expected_balance + entry.amount` and append `entry`, as one
    /// write, only if the pool still holds `expected_balance`.
    async fn commit_ledger_entry(
        &self,
        user_id: Id,
        pool: BalancePool,
        expected_balance: Amount,
        entry: NewTransaction,
    ) -> StoreResult<Option<Transaction>>;

    /// Ledger history, oldest first.
    async fn transactions(&self, user_id: Id) -> StoreResult<Vec<Transaction>>;

    // ── Projects ─────────────────────────────────────────────────────

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project>;

    async fn project(&self, id: Id) -> StoreResult<Option<Project>>;

    /// Projects where the user is the owner or the awarded supplier.
    async fn projects_for_user(&self, user_id: Id) -> StoreResult<Vec<Project>>;

    /// Record `award` and move `open → awarded`, only if still open.
    async fn award_if_open(&self, id: Id, award: Award) -> StoreResult<bool>;

    async fn transition_status(
        &self,
        id: Id,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<bool>;

    /// Remove the project and, by cascade, its bids and review.
    async fn delete_project(&self, id: Id) -> StoreResult<bool>;

    // ── Bids ─────────────────────────────────────────────────────────

    async fn insert_bid(&self, bid: NewBid) -> StoreResult<Bid>;

    async fn bid(&self, id: Id) -> StoreResult<Option<Bid>>;

    /// Bids on a project, oldest first.
    async fn bids_for_project(&self, project_id: Id) -> StoreResult<Vec<Bid>>;

    // ── Reviews ──────────────────────────────────────────────────────

    async fn insert_review(&self, review: NewReview) -> StoreResult<Review>;

    async fn review(&self, id: Id) -> StoreResult<Option<Review>>;

    async fn review_for_project(&self, project_id: Id) -> StoreResult<Option<Review>>;

    async fn reviews_for_supplier(&self, supplier_id: Id) -> StoreResult<Vec<Review>>;

    async fn reviews_with_status(&self, status: ReviewStatus) -> StoreResult<Vec<Review>>;

    async fn update_review_status(&self, id: Id, status: ReviewStatus) -> StoreResult<bool>;

    async fn delete_review(&self, id: Id) -> StoreResult<bool>;

    // ── Messages ─────────────────────────────────────────────────────

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Messages exchanged between `a` and `b` in either direction with
    /// `created_at > since`, oldest first.
    async fn conversation_since(&self, a: Id, b: Id, since: Timestamp)
        -> StoreResult<Vec<Message>>;
}

/// Time source for record timestamps.
///
/// Abstracted so tests can drive deterministic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in Unix milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}
