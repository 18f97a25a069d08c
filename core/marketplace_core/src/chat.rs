//! # Chat gating
//!
//! Whether two users may talk is derived from current project state on every
//! send and never stored: admins may talk to anyone, and a customer and a
//! supplier may talk once a project between them has been awarded. Bidding
//! alone opens nothing.
//!
//! Delivery is pull-based through [`Marketplace::fetch_since`]; the gate does
//! not care how messages reach the recipient.

use tracing::{info, warn};

use crate::errors::{MarketError, Result};
use crate::events::{Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{Id, Message, NewMessage, Project, Timestamp, User};
use crate::Marketplace;

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4_000;

/// Pure gate over the two users and the projects currently visible for them.
pub fn can_message(a: &User, b: &User, projects: &[Project]) -> bool {
    if a.is_admin() || b.is_admin() {
        return true;
    }
    projects.iter().any(|p| {
        p.status.has_award()
            && p.awarded_supplier().is_some_and(|supplier| {
                (p.customer_id == a.id && supplier == b.id)
                    || (p.customer_id == b.id && supplier == a.id)
            })
    })
}

impl Marketplace {
    /// Evaluate the gate against a fresh read of `a`'s projects.
    pub async fn may_message(&self, a: Id, b: Id) -> Result<bool> {
        let sender = load_user(self.store(), a).await?;
        let recipient = load_user(self.store(), b).await?;
        let projects = self.store().projects_for_user(a).await?;
        Ok(can_message(&sender, &recipient, &projects))
    }

    pub async fn send_message(
        &self,
        sender_id: Id,
        recipient_id: Id,
        body: impl Into<String>,
    ) -> Result<Message> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(MarketError::InvalidInput("message body is empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(MarketError::InvalidInput(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let sender = load_user(self.store(), sender_id).await?;
        let recipient = load_user(self.store(), recipient_id).await?;
        rbac::require_active(&sender)?;
        rbac::require_active(&recipient)?;

        let projects = self.store().projects_for_user(sender_id).await?;
        if !can_message(&sender, &recipient, &projects) {
            warn!(sender_id, recipient_id, "message blocked: no awarded project between users");
            return Err(MarketError::CommunicationNotAuthorized {
                from: sender_id,
                to: recipient_id,
            });
        }

        let message = self
            .store()
            .insert_message(NewMessage {
                sender_id,
                recipient_id,
                body,
                created_at: self.now(),
            })
            .await?;
        info!(message_id = message.id, sender_id, recipient_id, "message sent");

        self.emit(
            Notification::new(
                recipient_id,
                NotificationKind::MessageReceived,
                format!("New message from {}", sender.name),
            )
            .with_link(format!("/messages/{sender_id}")),
        )
        .await;
        Ok(message)
    }

    /// Messages between `user_id` and `peer_id` newer than `since`, oldest first.
    pub async fn fetch_since(
        &self,
        user_id: Id,
        peer_id: Id,
        since: Timestamp,
    ) -> Result<Vec<Message>> {
        load_user(self.store(), user_id).await?;
        load_user(self.store(), peer_id).await?;
        Ok(self
            .store()
            .conversation_since(user_id, peer_id, since)
            .await?)
    }
}
