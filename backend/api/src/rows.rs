//! Mapping layer between SQLite rows and core entities.
//!
//! This is the only place column names and stored strings are interpreted.
//! Rows with unknown enum strings (including legacy casings such as
//! `"In Progress"`) or a half-written award are reported as corrupt instead of
//! being guessed at.

use marketplace_core::{
    AccountStatus, Award, Bid, Message, Notification, PaymentStatus, Project, ProjectStatus,
    Ratings, Review, ReviewStatus, Role, StoreError, Transaction, TransactionKind, User,
    VerificationStatus,
};
use serde::Serialize;

fn parse_enum<T>(
    parse: impl Fn(&str) -> Option<T>,
    table: &str,
    column: &str,
    id: i64,
    raw: &str,
) -> Result<T, StoreError> {
    parse(raw).ok_or_else(|| {
        StoreError::Corrupt(format!("{table}.{column} of row {id} has unknown value {raw:?}"))
    })
}

fn score(table: &str, id: i64, value: i64) -> Result<u8, StoreError> {
    u8::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{table} row {id} has rating {value}")))
}

/// Translate a driver error into the core's store taxonomy.
pub fn store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::CheckViolation => StoreError::Conflict(db.message().to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(e.to_string())
        }
        _ => StoreError::Unavailable(e.to_string()),
    }
}

// ─────────────────────────────────────────────────────────
// Users and ledger
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub account_status: String,
    pub verification_status: String,
    pub wallet_balance: i64,
    pub bid_balance: i64,
    pub created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            role: parse_enum(Role::parse, "users", "role", row.id, &row.role)?,
            account_status: parse_enum(
                AccountStatus::parse,
                "users",
                "account_status",
                row.id,
                &row.account_status,
            )?,
            verification_status: parse_enum(
                VerificationStatus::parse,
                "users",
                "verification_status",
                row.id,
                &row.verification_status,
            )?,
            id: row.id,
            name: row.name,
            email: row.email,
            wallet_balance: row.wallet_balance,
            bid_balance: row.bid_balance,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: String,
    pub description: String,
    pub created_at: i64,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            kind: parse_enum(TransactionKind::parse, "transactions", "kind", row.id, &row.kind)?,
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Projects and bids
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub customer_id: i64,
    pub title: String,
    pub description: String,
    pub budget: i64,
    pub payment_status: String,
    pub status: String,
    pub awarded_supplier_id: Option<i64>,
    pub awarded_bid_id: Option<i64>,
    pub awarded_amount: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let award = match (row.awarded_supplier_id, row.awarded_bid_id, row.awarded_amount) {
            (Some(supplier_id), Some(bid_id), Some(amount)) => Some(Award {
                supplier_id,
                bid_id,
                amount,
            }),
            (None, None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "project {} has a partially written award",
                    row.id
                )))
            }
        };
        Ok(Project {
            status: parse_enum(ProjectStatus::parse, "projects", "status", row.id, &row.status)?,
            payment_status: parse_enum(
                PaymentStatus::parse,
                "projects",
                "payment_status",
                row.id,
                &row.payment_status,
            )?,
            award,
            id: row.id,
            customer_id: row.customer_id,
            title: row.title,
            description: row.description,
            budget: row.budget,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BidRow {
    pub id: i64,
    pub project_id: i64,
    pub supplier_id: i64,
    pub amount: i64,
    pub message: String,
    pub created_at: i64,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        Bid {
            id: row.id,
            project_id: row.project_id,
            supplier_id: row.supplier_id,
            amount: row.amount,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Reviews, messages, notifications
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub project_id: i64,
    pub reviewer_id: i64,
    pub supplier_id: i64,
    pub quality: i64,
    pub communication: i64,
    pub punctuality: i64,
    pub professionalism: i64,
    pub value: i64,
    pub comment: String,
    pub status: String,
    pub created_at: i64,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let ratings = Ratings {
            quality: score("reviews", row.id, row.quality)?,
            communication: score("reviews", row.id, row.communication)?,
            punctuality: score("reviews", row.id, row.punctuality)?,
            professionalism: score("reviews", row.id, row.professionalism)?,
            value: score("reviews", row.id, row.value)?,
        };
        Ok(Review {
            status: parse_enum(ReviewStatus::parse, "reviews", "status", row.id, &row.status)?,
            ratings,
            id: row.id,
            project_id: row.project_id,
            reviewer_id: row.reviewer_id,
            supplier_id: row.supplier_id,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub body: String,
    pub created_at: i64,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

/// A stored notification as served to its recipient.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub created_at: i64,
}

impl NotificationRecord {
    pub fn pending(notification: &Notification, created_at: i64) -> Self {
        NotificationRecord {
            id: 0,
            user_id: notification.user_id,
            kind: notification.kind.as_str().to_string(),
            message: notification.message.clone(),
            link: notification.link.clone(),
            created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
