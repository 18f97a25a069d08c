//! Database layer: pool setup, migrations, and the SQLite [`Store`].

use std::str::FromStr;

use async_trait::async_trait;
use marketplace_core::storage::StoreResult;
use marketplace_core::{
    AccountStatus, Amount, Award, BalancePool, Bid, Id, Message, NewBid, NewMessage, NewProject,
    NewReview, NewTransaction, NewUser, Project, ProjectStatus, Review, ReviewStatus, Store,
    StoreError, Timestamp, Transaction, User, VerificationStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::errors::Result;
use crate::rows::{
    store_error, BidRow, MessageRow, NotificationRecord, ProjectRow, ReviewRow, TransactionRow,
    UserRow,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

const USER_COLUMNS: &str = "id, name, email, role, account_status, verification_status, \
                            wallet_balance, bid_balance, created_at";
const PROJECT_COLUMNS: &str = "id, customer_id, title, description, budget, payment_status, \
                               status, awarded_supplier_id, awarded_bid_id, awarded_amount, \
                               created_at";
const REVIEW_COLUMNS: &str = "id, project_id, reviewer_id, supplier_id, quality, communication, \
                              punctuality, professionalism, value, comment, status, created_at";

fn balance_column(pool: BalancePool) -> &'static str {
    match pool {
        BalancePool::Wallet => "wallet_balance",
        BalancePool::BidBalance => "bid_balance",
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// [`Store`] over the SQLite schema in `migrations/`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_project(&self, id: Id) -> StoreResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(Project::try_from)
            .transpose()
    }

    /// Reviews whose integer `column` equals `id`.
    async fn fetch_reviews(&self, column: &str, id: Id) -> StoreResult<Vec<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE {column} = ?1 ORDER BY id");
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        convert_all(rows)
    }
}

#[async_trait]
impl Store for SqliteStore {
    // ── Users ────────────────────────────────────────────────────────

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, role, account_status, verification_status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(AccountStatus::Active.as_str())
        .bind(user.verification_status.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        Ok(User {
            id,
            name: user.name,
            email: user.email,
            role: user.role,
            account_status: AccountStatus::Active,
            verification_status: user.verification_status,
            wallet_balance: 0,
            bid_balance: 0,
            created_at: user.created_at,
        })
    }

    async fn user(&self, id: Id) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        convert_all(rows)
    }

    async fn update_user_status(
        &self,
        id: Id,
        account_status: AccountStatus,
        verification_status: VerificationStatus,
    ) -> StoreResult<bool> {
        let affected = sqlx::query(
            "UPDATE users SET account_status = ?1, verification_status = ?2 WHERE id = ?3",
        )
        .bind(account_status.as_str())
        .bind(verification_status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .rows_affected();
        Ok(affected == 1)
    }

    async fn delete_user(&self, id: Id) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let removed = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?
            .rows_affected();
        if removed == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Ok(false);
        }

        // Bids and reviews of owned projects go with them via ON DELETE CASCADE.
        sqlx::query("DELETE FROM projects WHERE customer_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query(
            r#"
            DELETE FROM bids
            WHERE  supplier_id = ?1
              AND  id NOT IN (SELECT awarded_bid_id FROM projects
                              WHERE awarded_bid_id IS NOT NULL)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        sqlx::query("DELETE FROM transactions WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    // ── Ledger ───────────────────────────────────────────────────────

    async fn commit_ledger_entry(
        &self,
        user_id: Id,
        pool: BalancePool,
        expected_balance: Amount,
        entry: NewTransaction,
    ) -> StoreResult<Option<Transaction>> {
        let column = balance_column(pool);
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let sql = format!(
            "UPDATE users SET {column} = {column} + ?1 WHERE id = ?2 AND {column} = ?3"
        );
        let updated = sqlx::query(&sql)
            .bind(entry.amount)
            .bind(user_id)
            .bind(expected_balance)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?
            .rows_affected();
        if updated == 0 {
            tx.rollback().await.map_err(store_error)?;
            debug!(user_id, column, expected_balance, "ledger precondition failed");
            return Ok(None);
        }

        let id = sqlx::query(
            r#"
            INSERT INTO transactions (user_id, amount, kind, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(user_id)
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        tx.commit().await.map_err(store_error)?;
        Ok(Some(Transaction {
            id,
            user_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description,
            created_at: entry.created_at,
        }))
    }

    async fn transactions(&self, user_id: Id) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, amount, kind, description, created_at
            FROM   transactions
            WHERE  user_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        convert_all(rows)
    }

    // ── Projects ─────────────────────────────────────────────────────

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let id = sqlx::query(
            r#"
            INSERT INTO projects (customer_id, title, description, budget, payment_status, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(project.customer_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.budget)
        .bind(project.payment_status.as_str())
        .bind(ProjectStatus::Open.as_str())
        .bind(project.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        Ok(Project {
            id,
            customer_id: project.customer_id,
            title: project.title,
            description: project.description,
            budget: project.budget,
            payment_status: project.payment_status,
            status: ProjectStatus::Open,
            award: None,
            created_at: project.created_at,
        })
    }

    async fn project(&self, id: Id) -> StoreResult<Option<Project>> {
        self.fetch_project(id).await
    }

    async fn projects_for_user(&self, user_id: Id) -> StoreResult<Vec<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE customer_id = ?1 OR awarded_supplier_id = ?1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        convert_all(rows)
    }

    async fn award_if_open(&self, id: Id, award: Award) -> StoreResult<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE projects
            SET    status = ?1, awarded_supplier_id = ?2, awarded_bid_id = ?3, awarded_amount = ?4
            WHERE  id = ?5 AND status = ?6 AND awarded_bid_id IS NULL
            "#,
        )
        .bind(ProjectStatus::Awarded.as_str())
        .bind(award.supplier_id)
        .bind(award.bid_id)
        .bind(award.amount)
        .bind(id)
        .bind(ProjectStatus::Open.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .rows_affected();
        Ok(affected == 1)
    }

    async fn transition_status(
        &self,
        id: Id,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<bool> {
        let affected = sqlx::query("UPDATE projects SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();
        Ok(affected == 1)
    }

    async fn delete_project(&self, id: Id) -> StoreResult<bool> {
        let affected = sqlx::query("DELETE FROM projects WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();
        Ok(affected == 1)
    }

    // ── Bids ─────────────────────────────────────────────────────────

    async fn insert_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        // Inserts nothing unless the project is still open at write time.
        let result = sqlx::query(
            r#"
            INSERT INTO bids (project_id, supplier_id, amount, message, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE  EXISTS (SELECT 1 FROM projects WHERE id = ?1 AND status = ?6)
            "#,
        )
        .bind(bid.project_id)
        .bind(bid.supplier_id)
        .bind(bid.amount)
        .bind(&bid.message)
        .bind(bid.created_at)
        .bind(ProjectStatus::Open.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "project {} is not open",
                bid.project_id
            )));
        }
        let id = result.last_insert_rowid();

        Ok(Bid {
            id,
            project_id: bid.project_id,
            supplier_id: bid.supplier_id,
            amount: bid.amount,
            message: bid.message,
            created_at: bid.created_at,
        })
    }

    async fn bid(&self, id: Id) -> StoreResult<Option<Bid>> {
        let row = sqlx::query_as::<_, BidRow>(
            "SELECT id, project_id, supplier_id, amount, message, created_at FROM bids WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(Bid::from))
    }

    async fn bids_for_project(&self, project_id: Id) -> StoreResult<Vec<Bid>> {
        let rows = sqlx::query_as::<_, BidRow>(
            r#"
            SELECT id, project_id, supplier_id, amount, message, created_at
            FROM   bids
            WHERE  project_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(Bid::from).collect())
    }

    // ── Reviews ──────────────────────────────────────────────────────

    async fn insert_review(&self, review: NewReview) -> StoreResult<Review> {
        let r = review.ratings;
        let id = sqlx::query(
            r#"
            INSERT INTO reviews
                (project_id, reviewer_id, supplier_id, quality, communication, punctuality,
                 professionalism, value, comment, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(review.project_id)
        .bind(review.reviewer_id)
        .bind(review.supplier_id)
        .bind(i64::from(r.quality))
        .bind(i64::from(r.communication))
        .bind(i64::from(r.punctuality))
        .bind(i64::from(r.professionalism))
        .bind(i64::from(r.value))
        .bind(&review.comment)
        .bind(ReviewStatus::Pending.as_str())
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        Ok(Review {
            id,
            project_id: review.project_id,
            reviewer_id: review.reviewer_id,
            supplier_id: review.supplier_id,
            ratings: review.ratings,
            comment: review.comment,
            status: ReviewStatus::Pending,
            created_at: review.created_at,
        })
    }

    async fn review(&self, id: Id) -> StoreResult<Option<Review>> {
        Ok(self.fetch_reviews("id", id).await?.pop())
    }

    async fn review_for_project(&self, project_id: Id) -> StoreResult<Option<Review>> {
        Ok(self.fetch_reviews("project_id", project_id).await?.pop())
    }

    async fn reviews_for_supplier(&self, supplier_id: Id) -> StoreResult<Vec<Review>> {
        self.fetch_reviews("supplier_id", supplier_id).await
    }

    async fn reviews_with_status(&self, status: ReviewStatus) -> StoreResult<Vec<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE status = ?1 ORDER BY id");
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        convert_all(rows)
    }

    async fn update_review_status(&self, id: Id, status: ReviewStatus) -> StoreResult<bool> {
        let affected = sqlx::query("UPDATE reviews SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();
        Ok(affected == 1)
    }

    async fn delete_review(&self, id: Id) -> StoreResult<bool> {
        let affected = sqlx::query("DELETE FROM reviews WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();
        Ok(affected == 1)
    }

    // ── Messages ─────────────────────────────────────────────────────

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let id = sqlx::query(
            r#"
            INSERT INTO messages (sender_id, recipient_id, body, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .last_insert_rowid();

        Ok(Message {
            id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            body: message.body,
            created_at: message.created_at,
        })
    }

    async fn conversation_since(
        &self,
        a: Id,
        b: Id,
        since: Timestamp,
    ) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, recipient_id, body, created_at
            FROM   messages
            WHERE  created_at > ?3
              AND  ((sender_id = ?1 AND recipient_id = ?2)
                 OR (sender_id = ?2 AND recipient_id = ?1))
            ORDER  BY created_at ASC, id ASC
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}

// ─────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────

/// Persist a notification; returns its row id.
pub async fn insert_notification(pool: &SqlitePool, record: &NotificationRecord) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, message, link, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(record.user_id)
    .bind(&record.kind)
    .bind(&record.message)
    .bind(&record.link)
    .bind(record.created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// A user's notifications, newest first.
pub async fn notifications_for(pool: &SqlitePool, user_id: Id) -> Result<Vec<NotificationRecord>> {
    let rows = sqlx::query_as::<_, NotificationRecord>(
        r#"
        SELECT id, user_id, kind, message, link, created_at
        FROM   notifications
        WHERE  user_id = ?1
        ORDER  BY id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
