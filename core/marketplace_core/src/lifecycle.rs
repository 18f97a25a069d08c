//! # Project lifecycle
//!
//! ```text
//! create ──► Open ──accept_bid──► Awarded ──mark_complete──► Completed
//!              └──delete_project──► Cancelled (then removed)
//! ```
//!
//! Every transition is a conditional write on the expected source status. The
//! status check before it only produces a precise error message; the store
//! write is what decides a race.

use tracing::{info, warn};

use crate::errors::{Entity, MarketError, Result};
use crate::events::{project_link, Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{
    Amount, Award, Id, NewProject, PaymentStatus, Project, ProjectDetails, ProjectStatus, Role,
    TransactionKind,
};
use crate::Marketplace;

impl Marketplace {
    /// Post a project, after collecting the posting fee if one is configured.
    pub async fn create_project(
        &self,
        customer_id: Id,
        title: impl Into<String>,
        description: impl Into<String>,
        budget: Amount,
    ) -> Result<Project> {
        let customer = load_user(self.store(), customer_id).await?;
        rbac::require_role(&customer, Role::Customer)?;
        rbac::require_active(&customer)?;
        if budget <= 0 {
            return Err(MarketError::InvalidAmount(budget));
        }
        let title = title.into();
        if title.trim().is_empty() {
            return Err(MarketError::InvalidInput("title must not be empty".into()));
        }

        let fee_tx = self
            .charge_fee(
                customer_id,
                self.fees().posting_fee,
                TransactionKind::ProjectFee,
                format!("Posting fee for \"{title}\""),
            )
            .await?;
        let payment_status = if fee_tx.is_some() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::NotApplicable
        };

        let project = match self
            .store()
            .insert_project(NewProject {
                customer_id,
                title,
                description: description.into(),
                budget,
                payment_status,
                created_at: self.now(),
            })
            .await
        {
            Ok(project) => project,
            Err(e) => {
                self.refund_fee(fee_tx.as_ref(), "project was not created").await;
                return Err(e.into());
            }
        };
        info!(project_id = project.id, customer_id, budget, "project created");
        Ok(project)
    }

    pub async fn project(&self, project_id: Id) -> Result<Project> {
        self.store()
            .project(project_id)
            .await?
            .ok_or_else(|| MarketError::not_found(Entity::Project, project_id))
    }

    /// The project with its bids and review.
    pub async fn project_details(&self, project_id: Id) -> Result<ProjectDetails> {
        let project = self.project(project_id).await?;
        let bids = self.store().bids_for_project(project_id).await?;
        let review = self.store().review_for_project(project_id).await?;
        Ok(ProjectDetails {
            project,
            bids,
            review,
        })
    }

    pub async fn projects_for_user(&self, user_id: Id) -> Result<Vec<Project>> {
        load_user(self.store(), user_id).await?;
        Ok(self.store().projects_for_user(user_id).await?)
    }

    /// Award the project to one of its bids. Exactly one concurrent caller wins.
    pub async fn accept_bid(&self, project_id: Id, bid_id: Id, caller_id: Id) -> Result<Project> {
        let project = self.project(project_id).await?;
        if project.customer_id != caller_id {
            return Err(MarketError::NotAuthorized(format!(
                "user {caller_id} does not own project {project_id}"
            )));
        }
        let customer = load_user(self.store(), caller_id).await?;
        rbac::require_active(&customer)?;
        if project.status != ProjectStatus::Open {
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} is already {}",
                project.status
            )));
        }

        let bid = self
            .store()
            .bid(bid_id)
            .await?
            .filter(|b| b.project_id == project_id)
            .ok_or_else(|| MarketError::not_found(Entity::Bid, bid_id))?;
        let supplier = load_user(self.store(), bid.supplier_id).await?;
        rbac::require_verified_supplier(&supplier)?;

        let award = Award {
            supplier_id: bid.supplier_id,
            bid_id: bid.id,
            amount: bid.amount,
        };
        if !self.store().award_if_open(project_id, award).await? {
            warn!(project_id, bid_id, "award lost race: project no longer open");
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} is no longer open"
            )));
        }
        info!(project_id, bid_id, supplier_id = bid.supplier_id, "bid accepted");
        let awarded = Project {
            status: ProjectStatus::Awarded,
            award: Some(award),
            ..project
        };

        let link = project_link(project_id);
        self.emit(
            Notification::new(
                bid.supplier_id,
                NotificationKind::BidAccepted,
                format!("Your bid on \"{}\" was accepted", awarded.title),
            )
            .with_link(link.clone()),
        )
        .await;
        match self.store().bids_for_project(project_id).await {
            Ok(bids) => {
                for other in bids.into_iter().filter(|b| b.id != bid.id) {
                    self.emit(
                        Notification::new(
                            other.supplier_id,
                            NotificationKind::BidDeclined,
                            format!("\"{}\" was awarded to another supplier", awarded.title),
                        )
                        .with_link(link.clone()),
                    )
                    .await;
                }
            }
            Err(e) => warn!(project_id, "skipping decline notifications: {e}"),
        }

        Ok(awarded)
    }

    /// Close an awarded project. Either party may do it.
    pub async fn mark_complete(&self, project_id: Id, caller_id: Id) -> Result<Project> {
        let project = self.project(project_id).await?;
        if !project.is_participant(caller_id) {
            return Err(MarketError::NotAuthorized(format!(
                "user {caller_id} is not a party to project {project_id}"
            )));
        }
        let caller = load_user(self.store(), caller_id).await?;
        rbac::require_active(&caller)?;
        self.transition(&project, ProjectStatus::Awarded, ProjectStatus::Completed)
            .await?;
        info!(project_id, caller_id, "project completed");

        let counterparty = if caller_id == project.customer_id {
            project.awarded_supplier()
        } else {
            Some(project.customer_id)
        };
        if let Some(user_id) = counterparty {
            self.emit(
                Notification::new(
                    user_id,
                    NotificationKind::ProjectCompleted,
                    format!("\"{}\" was marked complete", project.title),
                )
                .with_link(project_link(project_id)),
            )
            .await;
        }

        Ok(Project {
            status: ProjectStatus::Completed,
            ..project
        })
    }

    /// Withdraw an open project. Its bids go with it; the posting fee stays spent.
    pub async fn delete_project(&self, project_id: Id, caller_id: Id) -> Result<()> {
        let project = self.project(project_id).await?;
        if project.customer_id != caller_id {
            return Err(MarketError::NotAuthorized(format!(
                "user {caller_id} does not own project {project_id}"
            )));
        }
        // Cancelling first shuts out a concurrent award.
        self.transition(&project, ProjectStatus::Open, ProjectStatus::Cancelled)
            .await?;
        self.store().delete_project(project_id).await?;
        info!(project_id, caller_id, "project cancelled and removed");
        Ok(())
    }

    async fn transition(
        &self,
        project: &Project,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> Result<()> {
        debug_assert!(from.can_transition_to(to));
        if project.status != from {
            return Err(MarketError::invalid_transition(format!(
                "project {} is {}, expected {from}",
                project.id, project.status
            )));
        }
        if !self.store().transition_status(project.id, from, to).await? {
            warn!(project_id = project.id, %from, %to, "transition lost race");
            return Err(MarketError::invalid_transition(format!(
                "project {} is no longer {from}",
                project.id
            )));
        }
        Ok(())
    }
}
