//! # Marketplace Core
//!
//! The project lifecycle, fee ledger and communication-authorization core of
//! a two-sided home-services marketplace: customers post projects, suppliers
//! bid, one bid is awarded, work proceeds, and a review closes the loop.
//!
//! | Phase          | Entry Point(s)                                              |
//! |----------------|-------------------------------------------------------------|
//! | Accounts       | `register_user`, `set_verification_status`, `set_account_status`, `remove_user` |
//! | Ledger         | [`Marketplace::debit`], [`Marketplace::credit`], `top_up`, `admin_credit`, `transactions` |
//! | Posting        | [`Marketplace::create_project`], `delete_project`           |
//! | Bidding        | [`Marketplace::place_bid`]                                  |
//! | Award          | [`Marketplace::accept_bid`], `mark_complete`                |
//! | Messaging      | [`Marketplace::send_message`], `fetch_since`, [`chat::can_message`] |
//! | Reviews        | [`Marketplace::submit_review`], `set_review_status`, `delete_review`, `supplier_rating` |
//!
//! ## Architecture
//!
//! Persistence is fully delegated to an injected [`Store`]; the core keeps no
//! cache and every decision is taken against a fresh read. Role checks live in
//! [`rbac`]. Notifications go to an injected [`Notifier`] and never influence
//! the outcome of an operation.
//!
//! Fee debits always happen before the state change they pay for, and the two
//! contended writes (balance changes and awards) are conditional writes at the
//! store, so concurrent callers cannot double-spend or double-award.

use std::sync::Arc;

pub mod accounts;
pub mod bids;
pub mod chat;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod rbac;
pub mod reviews;
pub mod storage;
pub mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod testutil;
#[cfg(test)]
mod test_flows;
#[cfg(test)]
mod test_concurrency;

pub use errors::{Entity, MarketError, Result, StoreError};
pub use events::{NoopNotifier, Notification, NotificationKind, Notifier};
pub use memory::MemoryStore;
pub use storage::{Clock, Store, SystemClock};
pub use types::*;

/// Entry point to every marketplace operation.
///
/// Cheap to clone; clones share the same store, notifier and clock.
#[derive(Clone)]
pub struct Marketplace {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    fees: FeeSchedule,
}

impl Marketplace {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, fees: FeeSchedule) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            fees,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) async fn emit(&self, notification: Notification) {
        tracing::debug!(
            user_id = notification.user_id,
            kind = notification.kind.as_str(),
            "emitting notification"
        );
        self.notifier.notify(notification).await;
    }
}
