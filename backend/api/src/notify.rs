//! Notification sink: persists every notification for the recipient's inbox
//! and, when a webhook is configured, forwards it in the background.
//!
//! ## Resilience
//!
//! * Webhook delivery runs on its own task, so a slow endpoint never delays
//!   the marketplace operation that produced the notification.
//! * Failed or rate-limited deliveries are retried with exponential back-off
//!   up to [`RetryPolicy::max_delay`], and dropped after
//!   [`RetryPolicy::max_attempts`] tries.

use std::time::Duration;

use async_trait::async_trait;
use marketplace_core::{Notification, Notifier};
use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db;
use crate::rows::NotificationRecord;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
struct Webhook {
    client: Client,
    url: String,
    policy: RetryPolicy,
}

#[derive(Clone)]
pub struct NotificationSink {
    pool: SqlitePool,
    webhook: Option<Webhook>,
}

impl NotificationSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            webhook: None,
        }
    }

    pub fn with_webhook(mut self, client: Client, url: String, policy: RetryPolicy) -> Self {
        self.webhook = Some(Webhook {
            client,
            url,
            policy,
        });
        self
    }
}

#[async_trait]
impl Notifier for NotificationSink {
    async fn notify(&self, notification: Notification) {
        let record =
            NotificationRecord::pending(&notification, chrono::Utc::now().timestamp_millis());
        match db::insert_notification(&self.pool, &record).await {
            Ok(id) => debug!(id, user_id = record.user_id, kind = %record.kind, "notification stored"),
            Err(e) => warn!(user_id = record.user_id, "Failed to store notification: {e}"),
        }

        if let Some(hook) = self.webhook.clone() {
            tokio::spawn(async move {
                deliver(&hook.client, &hook.url, &notification, hook.policy).await;
            });
        }
    }
}

/// POST `notification` to `url`, retrying per `policy`. Returns whether the
/// endpoint accepted it.
pub async fn deliver(
    client: &Client,
    url: &str,
    notification: &Notification,
    policy: RetryPolicy,
) -> bool {
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        match client.post(url).json(notification).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(user_id = notification.user_id, attempt, "notification delivered");
                return true;
            }
            Ok(resp) => warn!(
                "Webhook answered {} (attempt {attempt}/{})",
                resp.status(),
                policy.max_attempts
            ),
            Err(e) => warn!(
                "Webhook request failed (attempt {attempt}/{}): {e}",
                policy.max_attempts
            ),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(policy.max_delay);
        }
    }

    warn!(
        user_id = notification.user_id,
        kind = notification.kind.as_str(),
        "Dropping notification after {} attempts",
        policy.max_attempts
    );
    false
}
