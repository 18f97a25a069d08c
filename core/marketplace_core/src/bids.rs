//! # Bid registry
//!
//! One bid per supplier per project, placed only while the project is open and
//! only after the bid fee (if any) has been collected. Bids are never edited;
//! the award reads them and copies the winning amount onto the project.

use tracing::{info, warn};

use crate::errors::{Entity, MarketError, Result, StoreError};
use crate::events::{project_link, Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{Amount, Bid, Id, NewBid, ProjectStatus, TransactionKind};
use crate::Marketplace;

impl Marketplace {
    pub async fn place_bid(
        &self,
        project_id: Id,
        supplier_id: Id,
        amount: Amount,
        message: impl Into<String>,
    ) -> Result<Bid> {
        let supplier = load_user(self.store(), supplier_id).await?;
        rbac::require_verified_supplier(&supplier)?;
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(amount));
        }

        let project = self.project(project_id).await?;
        if project.status != ProjectStatus::Open {
            warn!(project_id, supplier_id, status = project.status.as_str(), "bid on closed project");
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} is {}, not open",
                project.status
            )));
        }
        let existing = self.store().bids_for_project(project_id).await?;
        if existing.iter().any(|b| b.supplier_id == supplier_id) {
            return Err(MarketError::invalid_transition(format!(
                "supplier {supplier_id} already bid on project {project_id}"
            )));
        }

        // The fee is collected before the bid exists; a failed debit means no bid.
        let fee_tx = self
            .charge_fee(
                supplier_id,
                self.fees().bid_fee,
                TransactionKind::BidFeeDeduction,
                format!("Bid fee for project {project_id}"),
            )
            .await?;

        let bid = match self
            .store()
            .insert_bid(NewBid {
                project_id,
                supplier_id,
                amount,
                message: message.into(),
                created_at: self.now(),
            })
            .await
        {
            Ok(bid) => bid,
            Err(e) => {
                self.refund_fee(fee_tx.as_ref(), "bid was not recorded").await;
                return Err(match e {
                    StoreError::Conflict(reason) => MarketError::InvalidStateTransition(reason),
                    other => other.into(),
                });
            }
        };
        info!(bid_id = bid.id, project_id, supplier_id, amount, "bid placed");

        self.emit(
            Notification::new(
                project.customer_id,
                NotificationKind::BidReceived,
                format!("{} bid {amount} on \"{}\"", supplier.name, project.title),
            )
            .with_link(project_link(project_id)),
        )
        .await;
        Ok(bid)
    }

    pub async fn bid(&self, bid_id: Id) -> Result<Bid> {
        self.store()
            .bid(bid_id)
            .await?
            .ok_or_else(|| MarketError::not_found(Entity::Bid, bid_id))
    }

    pub async fn bids_for_project(&self, project_id: Id) -> Result<Vec<Bid>> {
        self.project(project_id).await?;
        Ok(self.store().bids_for_project(project_id).await?)
    }
}
