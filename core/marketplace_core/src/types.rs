//! # Types
//!
//! Shared data structures used across all modules of the marketplace core.
//!
//! ## Design decisions
//!
//! ### Award as a single optional value
//!
//! A project's awarded supplier, bid and amount are stored together as one
//! [`Award`]. They are either all absent (the project is still open) or all
//! present, and the award is written exactly once by the accept-bid
//! conditional update.
//!
//! ### Status as a Finite-State Machine
//!
//! [`ProjectStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Open ──► Awarded ──► Completed
//!   └──► Cancelled
//! ```
//!
//! Transitions out of terminal states (`Completed`, `Cancelled`) are rejected.
//!
//! ### Canonical strings
//!
//! Every enum that crosses the persistence boundary has exactly one lowercase
//! string form (`as_str` / `parse`). Anything else is treated as corrupt data.

use serde::{Deserialize, Serialize};

/// Monetary amount in minor units of the single marketplace currency.
pub type Amount = i64;

/// Store-assigned record identifier.
pub type Id = i64;

/// Unix epoch milliseconds.
pub type Timestamp = i64;

macro_rules! canonical_str {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($s => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Supplier,
    Admin,
}

canonical_str!(Role {
    Customer => "customer",
    Supplier => "supplier",
    Admin => "admin",
});

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
}

canonical_str!(AccountStatus {
    Active => "active",
    Blocked => "blocked",
});

/// Supplier vetting state. Customers and admins are `NotApplicable`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotApplicable,
    Pending,
    Verified,
    Rejected,
}

canonical_str!(VerificationStatus {
    NotApplicable => "not_applicable",
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

impl VerificationStatus {
    /// Status a freshly registered user of `role` starts with.
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Supplier => Self::Pending,
            Role::Customer | Role::Admin => Self::NotApplicable,
        }
    }
}

/// The monetary pool a role draws fees from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePool {
    /// Customer wallet, charged posting fees.
    Wallet,
    /// Supplier bid balance, charged bid fees.
    BidBalance,
}

impl BalancePool {
    /// `None` for admins, who hold no balance.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Customer => Some(Self::Wallet),
            Role::Supplier => Some(Self::BidBalance),
            Role::Admin => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub account_status: AccountStatus,
    pub verification_status: VerificationStatus,
    pub wallet_balance: Amount,
    pub bid_balance: Amount,
    pub created_at: Timestamp,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_active(&self) -> bool {
        self.account_status == AccountStatus::Active
    }

    /// Balance of the given pool.
    pub fn balance(&self, pool: BalancePool) -> Amount {
        match pool {
            BalancePool::Wallet => self.wallet_balance,
            BalancePool::BidBalance => self.bid_balance,
        }
    }
}

/// Registration payload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verification_status: VerificationStatus,
    pub created_at: Timestamp,
}

// ── Ledger ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    ProjectFee,
    BidFeeDeduction,
    Refund,
    AdminCredit,
}

canonical_str!(TransactionKind {
    Deposit => "deposit",
    ProjectFee => "project_fee",
    BidFeeDeduction => "bid_fee_deduction",
    Refund => "refund",
    AdminCredit => "admin_credit",
});

/// Append-only ledger entry. Positive amounts are credits, negative debits.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    pub user_id: Id,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewTransaction {
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub created_at: Timestamp,
}

// ── Projects ─────────────────────────────────────────────────────────

/// Lifecycle status of a project.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Accepting bids.
    Open,
    /// One bid accepted; work in progress.
    Awarded,
    /// Work finished; reviewable.
    Completed,
    /// Withdrawn by the owner before award.
    Cancelled,
}

canonical_str!(ProjectStatus {
    Open => "open",
    Awarded => "awarded",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl ProjectStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, to: ProjectStatus) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::Awarded)
                | (Self::Open, Self::Cancelled)
                | (Self::Awarded, Self::Completed)
        )
    }

    /// True once an award has happened, which is what opens the chat channel.
    pub fn has_award(&self) -> bool {
        matches!(self, Self::Awarded | Self::Completed)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NotApplicable,
}

canonical_str!(PaymentStatus {
    Paid => "paid",
    Unpaid => "unpaid",
    NotApplicable => "not_applicable",
});

/// The accepted bid, copied onto the project when it is awarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub supplier_id: Id,
    pub bid_id: Id,
    pub amount: Amount,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (store-assigned).
    pub id: Id,
    /// Customer who posted the project. Never changes.
    pub customer_id: Id,
    pub title: String,
    pub description: String,
    /// Customer's indicative budget.
    pub budget: Amount,
    pub payment_status: PaymentStatus,
    pub status: ProjectStatus,
    pub award: Option<Award>,
    pub created_at: Timestamp,
}

impl Project {
    pub fn awarded_supplier(&self) -> Option<Id> {
        self.award.map(|a| a.supplier_id)
    }

    /// Whether `user_id` is the owner or the awarded supplier.
    pub fn is_participant(&self, user_id: Id) -> bool {
        self.customer_id == user_id || self.awarded_supplier() == Some(user_id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewProject {
    pub customer_id: Id,
    pub title: String,
    pub description: String,
    pub budget: Amount,
    pub payment_status: PaymentStatus,
    pub created_at: Timestamp,
}

/// Read model combining a project with its bids and review.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectDetails {
    pub project: Project,
    pub bids: Vec<Bid>,
    pub review: Option<Review>,
}

// ── Bids ─────────────────────────────────────────────────────────────

/// A supplier's offer on a project. Immutable once stored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Id,
    pub project_id: Id,
    pub supplier_id: Id,
    pub amount: Amount,
    pub message: String,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewBid {
    pub project_id: Id,
    pub supplier_id: Id,
    pub amount: Amount,
    pub message: String,
    pub created_at: Timestamp,
}

// ── Reviews ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Declined,
}

canonical_str!(ReviewStatus {
    Pending => "pending",
    Approved => "approved",
    Declined => "declined",
});

/// Five named scores, each 1 to 5.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    pub quality: u8,
    pub communication: u8,
    pub punctuality: u8,
    pub professionalism: u8,
    pub value: u8,
}

impl Ratings {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn values(&self) -> [u8; 5] {
        [
            self.quality,
            self.communication,
            self.punctuality,
            self.professionalism,
            self.value,
        ]
    }

    /// First score outside `MIN..=MAX`, if any.
    pub fn out_of_range(&self) -> Option<u8> {
        self.values()
            .into_iter()
            .find(|v| !(Self::MIN..=Self::MAX).contains(v))
    }

    pub fn mean(&self) -> f64 {
        let values = self.values();
        values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Id,
    pub project_id: Id,
    pub reviewer_id: Id,
    pub supplier_id: Id,
    pub ratings: Ratings,
    pub comment: String,
    pub status: ReviewStatus,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewReview {
    pub project_id: Id,
    pub reviewer_id: Id,
    pub supplier_id: Id,
    pub ratings: Ratings,
    pub comment: String,
    pub created_at: Timestamp,
}

/// Published aggregate over a supplier's approved reviews.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RatingSummary {
    pub supplier_id: Id,
    pub approved_reviews: usize,
    /// `None` until at least one review is approved.
    pub average: Option<f64>,
}

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub sender_id: Id,
    pub recipient_id: Id,
    pub body: String,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMessage {
    pub sender_id: Id,
    pub recipient_id: Id,
    pub body: String,
    pub created_at: Timestamp,
}

// ── Configuration ────────────────────────────────────────────────────

/// Fees charged before the action they pay for. Zero disables a fee.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub posting_fee: Amount,
    pub bid_fee: Amount,
}
