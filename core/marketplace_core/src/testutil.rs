//! Shared fixtures for the crate's tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::events::{Notification, NotificationKind, Notifier};
use crate::memory::MemoryStore;
use crate::storage::{Clock, Store, StoreResult};
use crate::types::*;
use crate::Marketplace;

/// Clock that only moves when told to.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn advance(&self, millis: Timestamp) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

/// Keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<Notification>>);

impl RecordingNotifier {
    pub fn kinds_for(&self, user_id: Id) -> Vec<NotificationKind> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.kind)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

pub fn ratings(score: u8) -> Ratings {
    Ratings {
        quality: score,
        communication: score,
        punctuality: score,
        professionalism: score,
        value: score,
    }
}

type Hook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Store proxy for race and failure tests. Yields to the scheduler before
/// every call, runs one-shot hooks registered with [`YieldingStore::before_call`],
/// and fails the methods named in [`YieldingStore::fail_on`].
pub struct YieldingStore {
    inner: Arc<MemoryStore>,
    hooks: Mutex<HashMap<&'static str, Hook>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl YieldingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            hooks: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Every later call to `method` fails with `Unavailable`.
    pub fn fail_on(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    /// Run `hook` once, right before the next call to `method` reaches the store.
    pub fn before_call<F, Fut>(&self, method: &'static str, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook =
            Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(hook()) });
        self.hooks.lock().unwrap().insert(method, hook);
    }

    async fn intercept(&self, method: &'static str) -> StoreResult<()> {
        tokio::task::yield_now().await;
        let hook = self.hooks.lock().unwrap().remove(method);
        if let Some(hook) = hook {
            hook().await;
        }
        if self.failing.lock().unwrap().contains(method) {
            return Err(StoreError::Unavailable(format!("{method} timed out")));
        }
        Ok(())
    }
}

macro_rules! yield_then {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {{
        $self.intercept(stringify!($method)).await?;
        $self.inner.$method($($arg),*).await
    }};
}

#[async_trait]
impl Store for YieldingStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        yield_then!(self.insert_user(user))
    }
    async fn user(&self, id: Id) -> StoreResult<Option<User>> {
        yield_then!(self.user(id))
    }
    async fn users(&self) -> StoreResult<Vec<User>> {
        yield_then!(self.users())
    }
    async fn update_user_status(
        &self,
        id: Id,
        account_status: AccountStatus,
        verification_status: VerificationStatus,
    ) -> StoreResult<bool> {
        yield_then!(self.update_user_status(id, account_status, verification_status))
    }
    async fn delete_user(&self, id: Id) -> StoreResult<bool> {
        yield_then!(self.delete_user(id))
    }
    async fn commit_ledger_entry(
        &self,
        user_id: Id,
        pool: BalancePool,
        expected_balance: Amount,
        entry: NewTransaction,
    ) -> StoreResult<Option<Transaction>> {
        yield_then!(self.commit_ledger_entry(user_id, pool, expected_balance, entry))
    }
    async fn transactions(&self, user_id: Id) -> StoreResult<Vec<Transaction>> {
        yield_then!(self.transactions(user_id))
    }
    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        yield_then!(self.insert_project(project))
    }
    async fn project(&self, id: Id) -> StoreResult<Option<Project>> {
        yield_then!(self.project(id))
    }
    async fn projects_for_user(&self, user_id: Id) -> StoreResult<Vec<Project>> {
        yield_then!(self.projects_for_user(user_id))
    }
    async fn award_if_open(&self, id: Id, award: Award) -> StoreResult<bool> {
        yield_then!(self.award_if_open(id, award))
    }
    async fn transition_status(
        &self,
        id: Id,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<bool> {
        yield_then!(self.transition_status(id, from, to))
    }
    async fn delete_project(&self, id: Id) -> StoreResult<bool> {
        yield_then!(self.delete_project(id))
    }
    async fn insert_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        yield_then!(self.insert_bid(bid))
    }
    async fn bid(&self, id: Id) -> StoreResult<Option<Bid>> {
        yield_then!(self.bid(id))
    }
    async fn bids_for_project(&self, project_id: Id) -> StoreResult<Vec<Bid>> {
        yield_then!(self.bids_for_project(project_id))
    }
    async fn insert_review(&self, review: NewReview) -> StoreResult<Review> {
        yield_then!(self.insert_review(review))
    }
    async fn review(&self, id: Id) -> StoreResult<Option<Review>> {
        yield_then!(self.review(id))
    }
    async fn review_for_project(&self, project_id: Id) -> StoreResult<Option<Review>> {
        yield_then!(self.review_for_project(project_id))
    }
    async fn reviews_for_supplier(&self, supplier_id: Id) -> StoreResult<Vec<Review>> {
        yield_then!(self.reviews_for_supplier(supplier_id))
    }
    async fn reviews_with_status(&self, status: ReviewStatus) -> StoreResult<Vec<Review>> {
        yield_then!(self.reviews_with_status(status))
    }
    async fn update_review_status(&self, id: Id, status: ReviewStatus) -> StoreResult<bool> {
        yield_then!(self.update_review_status(id, status))
    }
    async fn delete_review(&self, id: Id) -> StoreResult<bool> {
        yield_then!(self.delete_review(id))
    }
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        yield_then!(self.insert_message(message))
    }
    async fn conversation_since(
        &self,
        a: Id,
        b: Id,
        since: Timestamp,
    ) -> StoreResult<Vec<Message>> {
        yield_then!(self.conversation_since(a, b, since))
    }
}

pub struct Harness {
    pub market: Marketplace,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    /// Pre-registered admin.
    pub admin: Id,
    seq: AtomicI64,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_fees(FeeSchedule::default()).await
    }

    pub async fn with_fees(fees: FeeSchedule) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock(AtomicI64::new(1_700_000_000_000)));
        let market = Marketplace::new(store.clone(), notifier.clone(), fees)
            .with_clock(clock.clone());
        let admin = market
            .register_user("admin", "admin@example.com", Role::Admin)
            .await
            .unwrap()
            .id;
        Self {
            market,
            store,
            notifier,
            clock,
            admin,
            seq: AtomicI64::new(0),
        }
    }

    /// A second marketplace over the same state, reaching it through a
    /// [`YieldingStore`] and reporting to the same notifier.
    pub fn proxied(&self) -> (Marketplace, Arc<YieldingStore>) {
        let store = Arc::new(YieldingStore::new(self.store.clone()));
        let market = Marketplace::new(store.clone(), self.notifier.clone(), self.market.fees())
            .with_clock(self.clock.clone());
        (market, store)
    }

    pub async fn register(&self, name: &str, role: Role) -> Id {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.market
            .register_user(name, format!("{name}.{n}@example.com"), role)
            .await
            .unwrap()
            .id
    }

    pub async fn user(&self, id: Id) -> User {
        self.market.user(id).await.unwrap()
    }

    /// Balance of the pool matching the user's role.
    pub async fn balance(&self, id: Id) -> i64 {
        let user = self.user(id).await;
        match user.role {
            Role::Supplier => user.bid_balance,
            _ => user.wallet_balance,
        }
    }

    pub async fn customer_with(&self, balance: i64) -> Id {
        let id = self.register("customer", Role::Customer).await;
        if balance > 0 {
            self.market.top_up(id, balance).await.unwrap();
        }
        id
    }

    pub async fn verified_supplier_with(&self, balance: i64) -> Id {
        let id = self.register("supplier", Role::Supplier).await;
        self.market
            .set_verification_status(self.admin, id, VerificationStatus::Verified)
            .await
            .unwrap();
        if balance > 0 {
            self.market.top_up(id, balance).await.unwrap();
        }
        id
    }

    /// A fresh customer with one open project; the posting fee is pre-funded.
    pub async fn open_project(&self, budget: i64) -> (Id, Id) {
        let customer = self.customer_with(self.market.fees().posting_fee).await;
        let project = self
            .market
            .create_project(customer, "Kitchen remodel", "New cabinets", budget)
            .await
            .unwrap();
        (customer, project.id)
    }

    /// `(customer, supplier, project)` with the supplier's bid accepted.
    pub async fn awarded_project(&self) -> (Id, Id, Id) {
        let (customer, project) = self.open_project(500).await;
        let supplier = self
            .verified_supplier_with(self.market.fees().bid_fee)
            .await;
        let bid = self
            .market
            .place_bid(project, supplier, 450, "")
            .await
            .unwrap();
        self.market
            .accept_bid(project, bid.id, customer)
            .await
            .unwrap();
        (customer, supplier, project)
    }

    pub async fn completed_project(&self) -> (Id, Id, Id) {
        let (customer, supplier, project) = self.awarded_project().await;
        self.market.mark_complete(project, customer).await.unwrap();
        (customer, supplier, project)
    }
}
