//! In-process [`Store`] backed by ordered maps under one mutex.
//!
//! Used by the test suite and by embedders that want no database.
//! Every trait method takes the lock once, so each call is atomic with respect
//! to every other call, which is the same guarantee the SQLite store gives.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::storage::{Store, StoreResult};
use crate::types::{
    AccountStatus, Amount, Award, BalancePool, Bid, Id, Message, NewBid, NewMessage, NewProject,
    NewReview, NewTransaction, NewUser, Project, ProjectStatus, Review, ReviewStatus, Timestamp,
    Transaction, User, VerificationStatus,
};

#[derive(Default)]
struct State {
    next_id: Id,
    users: BTreeMap<Id, User>,
    transactions: Vec<Transaction>,
    projects: BTreeMap<Id, Project>,
    bids: BTreeMap<Id, Bid>,
    reviews: BTreeMap<Id, Review>,
    messages: Vec<Message>,
}

impl State {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn remove_project_cascade(&mut self, id: Id) -> bool {
        let removed = self.projects.remove(&id).is_some();
        self.bids.retain(|_, b| b.project_id != id);
        self.reviews.retain(|_, r| r.project_id != id);
        removed
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Overwrite a project's status without any guard, to stage corrupt data.
    #[cfg(test)]
    pub(crate) fn force_status(&self, id: Id, status: ProjectStatus) {
        if let Some(p) = self.state.lock().unwrap().projects.get_mut(&id) {
            p.status = status;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        let id = state.allocate_id();
        let user = User {
            id,
            name: user.name,
            email: user.email,
            role: user.role,
            account_status: AccountStatus::Active,
            verification_status: user.verification_status,
            wallet_balance: 0,
            bid_balance: 0,
            created_at: user.created_at,
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Id) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn update_user_status(
        &self,
        id: Id,
        account_status: AccountStatus,
        verification_status: VerificationStatus,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.users.get_mut(&id) {
            Some(user) => {
                user.account_status = account_status;
                user.verification_status = verification_status;
                true
            }
            None => false,
        })
    }

    async fn delete_user(&self, id: Id) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<Id> = state
            .projects
            .values()
            .filter(|p| p.customer_id == id)
            .map(|p| p.id)
            .collect();
        for project_id in owned {
            state.remove_project_cascade(project_id);
        }
        let awarded_bids: Vec<Id> = state
            .projects
            .values()
            .filter_map(|p| p.award.map(|a| a.bid_id))
            .collect();
        state
            .bids
            .retain(|bid_id, b| b.supplier_id != id || awarded_bids.contains(bid_id));
        state.transactions.retain(|t| t.user_id != id);
        Ok(true)
    }

    async fn commit_ledger_entry(
        &self,
        user_id: Id,
        pool: BalancePool,
        expected_balance: Amount,
        entry: NewTransaction,
    ) -> StoreResult<Option<Transaction>> {
        let mut state = self.lock()?;
        let id = state.next_id + 1;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        let balance = match pool {
            BalancePool::Wallet => &mut user.wallet_balance,
            BalancePool::BidBalance => &mut user.bid_balance,
        };
        if *balance != expected_balance {
            return Ok(None);
        }
        let updated = expected_balance
            .checked_add(entry.amount)
            .filter(|b| *b >= 0)
            .ok_or_else(|| {
                StoreError::Conflict(format!("balance of user {user_id} would leave range"))
            })?;
        *balance = updated;
        state.next_id = id;

        let tx = Transaction {
            id,
            user_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description,
            created_at: entry.created_at,
        };
        state.transactions.push(tx.clone());
        Ok(Some(tx))
    }

    async fn transactions(&self, user_id: Id) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let mut state = self.lock()?;
        let id = state.allocate_id();
        let project = Project {
            id,
            customer_id: project.customer_id,
            title: project.title,
            description: project.description,
            budget: project.budget,
            payment_status: project.payment_status,
            status: ProjectStatus::Open,
            award: None,
            created_at: project.created_at,
        };
        state.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn project(&self, id: Id) -> StoreResult<Option<Project>> {
        Ok(self.lock()?.projects.get(&id).cloned())
    }

    async fn projects_for_user(&self, user_id: Id) -> StoreResult<Vec<Project>> {
        Ok(self
            .lock()?
            .projects
            .values()
            .filter(|p| p.is_participant(user_id))
            .cloned()
            .collect())
    }

    async fn award_if_open(&self, id: Id, award: Award) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.projects.get_mut(&id) {
            Some(p) if p.status == ProjectStatus::Open && p.award.is_none() => {
                p.status = ProjectStatus::Awarded;
                p.award = Some(award);
                true
            }
            _ => false,
        })
    }

    async fn transition_status(
        &self,
        id: Id,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.projects.get_mut(&id) {
            Some(p) if p.status == from => {
                p.status = to;
                true
            }
            _ => false,
        })
    }

    async fn delete_project(&self, id: Id) -> StoreResult<bool> {
        Ok(self.lock()?.remove_project_cascade(id))
    }

    async fn insert_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        let mut state = self.lock()?;
        match state.projects.get(&bid.project_id) {
            None => {
                return Err(StoreError::Conflict(format!(
                    "project {} does not exist",
                    bid.project_id
                )))
            }
            Some(p) if p.status != ProjectStatus::Open => {
                return Err(StoreError::Conflict(format!(
                    "project {} is {}, not open",
                    bid.project_id, p.status
                )))
            }
            Some(_) => {}
        }
        if state
            .bids
            .values()
            .any(|b| b.project_id == bid.project_id && b.supplier_id == bid.supplier_id)
        {
            return Err(StoreError::Conflict(format!(
                "supplier {} already bid on project {}",
                bid.supplier_id, bid.project_id
            )));
        }
        let id = state.allocate_id();
        let bid = Bid {
            id,
            project_id: bid.project_id,
            supplier_id: bid.supplier_id,
            amount: bid.amount,
            message: bid.message,
            created_at: bid.created_at,
        };
        state.bids.insert(id, bid.clone());
        Ok(bid)
    }

    async fn bid(&self, id: Id) -> StoreResult<Option<Bid>> {
        Ok(self.lock()?.bids.get(&id).cloned())
    }

    async fn bids_for_project(&self, project_id: Id) -> StoreResult<Vec<Bid>> {
        Ok(self
            .lock()?
            .bids
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_review(&self, review: NewReview) -> StoreResult<Review> {
        let mut state = self.lock()?;
        if state
            .reviews
            .values()
            .any(|r| r.project_id == review.project_id)
        {
            return Err(StoreError::Conflict(format!(
                "project {} already has a review",
                review.project_id
            )));
        }
        let id = state.allocate_id();
        let review = Review {
            id,
            project_id: review.project_id,
            reviewer_id: review.reviewer_id,
            supplier_id: review.supplier_id,
            ratings: review.ratings,
            comment: review.comment,
            status: ReviewStatus::Pending,
            created_at: review.created_at,
        };
        state.reviews.insert(id, review.clone());
        Ok(review)
    }

    async fn review(&self, id: Id) -> StoreResult<Option<Review>> {
        Ok(self.lock()?.reviews.get(&id).cloned())
    }

    async fn review_for_project(&self, project_id: Id) -> StoreResult<Option<Review>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .find(|r| r.project_id == project_id)
            .cloned())
    }

    async fn reviews_for_supplier(&self, supplier_id: Id) -> StoreResult<Vec<Review>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .filter(|r| r.supplier_id == supplier_id)
            .cloned()
            .collect())
    }

    async fn reviews_with_status(&self, status: ReviewStatus) -> StoreResult<Vec<Review>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn update_review_status(&self, id: Id, status: ReviewStatus) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.reviews.get_mut(&id) {
            Some(r) => {
                r.status = status;
                true
            }
            None => false,
        })
    }

    async fn delete_review(&self, id: Id) -> StoreResult<bool> {
        Ok(self.lock()?.reviews.remove(&id).is_some())
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut state = self.lock()?;
        let id = state.allocate_id();
        let message = Message {
            id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            body: message.body,
            created_at: message.created_at,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn conversation_since(
        &self,
        a: Id,
        b: Id,
        since: Timestamp,
    ) -> StoreResult<Vec<Message>> {
        Ok(self
            .lock()?
            .messages
            .iter()
            .filter(|m| {
                m.created_at > since
                    && ((m.sender_id == a && m.recipient_id == b)
                        || (m.sender_id == b && m.recipient_id == a))
            })
            .cloned()
            .collect())
    }
}
