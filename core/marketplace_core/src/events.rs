//! Notifications emitted to the external notification collaborator.
//!
//! Delivery is fire-and-forget: a [`Notifier`] never reports failure back
//! into the operation that produced the notification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Id;

/// All notification kinds the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A supplier bid on one of the recipient's projects.
    BidReceived,
    /// The recipient's bid won the project.
    BidAccepted,
    /// Another bid won a project the recipient bid on.
    BidDeclined,
    /// The counterparty marked a shared project complete.
    ProjectCompleted,
    /// A review about the recipient was submitted.
    ReviewSubmitted,
    /// An admin changed the status of the recipient's review.
    ReviewModerated,
    /// An admin changed the recipient's verification status.
    VerificationChanged,
    /// An admin changed the recipient's account status.
    AccountStatusChanged,
    /// Funds were credited to the recipient.
    BalanceCredited,
    /// A new chat message is waiting.
    MessageReceived,
}

impl NotificationKind {
    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BidReceived => "bid_received",
            Self::BidAccepted => "bid_accepted",
            Self::BidDeclined => "bid_declined",
            Self::ProjectCompleted => "project_completed",
            Self::ReviewSubmitted => "review_submitted",
            Self::ReviewModerated => "review_moderated",
            Self::VerificationChanged => "verification_changed",
            Self::AccountStatusChanged => "account_status_changed",
            Self::BalanceCredited => "balance_credited",
            Self::MessageReceived => "message_received",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Id,
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
}

impl Notification {
    pub fn new(user_id: Id, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) {}
}

pub(crate) fn project_link(project_id: Id) -> String {
    format!("/projects/{project_id}")
}
