//! # Review workflow
//!
//! A completed, awarded project can receive one review from its customer. The
//! review waits in `pending` until an admin moderates it; only `approved`
//! reviews count toward the supplier's published rating. Moderation can be
//! undone in any direction.

use tracing::info;

use crate::errors::{Entity, MarketError, Result, StoreError};
use crate::events::{project_link, Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{
    Id, NewReview, ProjectStatus, RatingSummary, Ratings, Review, ReviewStatus, Role,
};
use crate::Marketplace;

/// Mean of per-review scores over approved reviews only.
pub fn aggregate_rating(supplier_id: Id, reviews: &[Review]) -> RatingSummary {
    let scores: Vec<f64> = reviews
        .iter()
        .filter(|r| r.supplier_id == supplier_id && r.status == ReviewStatus::Approved)
        .map(|r| r.ratings.mean())
        .collect();
    let average = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };
    RatingSummary {
        supplier_id,
        approved_reviews: scores.len(),
        average,
    }
}

impl Marketplace {
    pub async fn submit_review(
        &self,
        project_id: Id,
        reviewer_id: Id,
        ratings: Ratings,
        comment: impl Into<String>,
    ) -> Result<Review> {
        if let Some(bad) = ratings.out_of_range() {
            return Err(MarketError::InvalidInput(format!(
                "rating {bad} outside {}..={}",
                Ratings::MIN,
                Ratings::MAX
            )));
        }

        let project = self.project(project_id).await?;
        if project.customer_id != reviewer_id {
            return Err(MarketError::NotAuthorized(format!(
                "user {reviewer_id} does not own project {project_id}"
            )));
        }
        if project.status != ProjectStatus::Completed {
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} is {}, not completed",
                project.status
            )));
        }
        let Some(supplier_id) = project.awarded_supplier() else {
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} is completed but has no awarded supplier"
            )));
        };
        if self.store().review_for_project(project_id).await?.is_some() {
            return Err(MarketError::invalid_transition(format!(
                "project {project_id} already has a review"
            )));
        }

        let review = self
            .store()
            .insert_review(NewReview {
                project_id,
                reviewer_id,
                supplier_id,
                ratings,
                comment: comment.into(),
                created_at: self.now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(reason) => MarketError::InvalidStateTransition(reason),
                other => other.into(),
            })?;
        info!(review_id = review.id, project_id, supplier_id, "review submitted");

        self.emit(
            Notification::new(
                supplier_id,
                NotificationKind::ReviewSubmitted,
                format!("You were reviewed for \"{}\"", project.title),
            )
            .with_link(project_link(project_id)),
        )
        .await;
        Ok(review)
    }

    pub async fn review(&self, review_id: Id) -> Result<Review> {
        self.store()
            .review(review_id)
            .await?
            .ok_or_else(|| MarketError::not_found(Entity::Review, review_id))
    }

    /// Admin moderation; any status may be set, including back to `pending`.
    pub async fn set_review_status(
        &self,
        review_id: Id,
        status: ReviewStatus,
        admin_id: Id,
    ) -> Result<Review> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        let review = self.review(review_id).await?;
        if review.status == status {
            return Ok(review);
        }

        if !self.store().update_review_status(review_id, status).await? {
            return Err(MarketError::not_found(Entity::Review, review_id));
        }
        info!(review_id, admin_id, from = %review.status, to = %status, "review moderated");

        self.emit(Notification::new(
            review.reviewer_id,
            NotificationKind::ReviewModerated,
            format!("Your review is now {status}"),
        ))
        .await;
        Ok(Review { status, ..review })
    }

    /// Admins and the review's author may delete it. The project is untouched.
    pub async fn delete_review(&self, review_id: Id, caller_id: Id) -> Result<()> {
        let caller = load_user(self.store(), caller_id).await?;
        let review = self.review(review_id).await?;
        if !caller.is_admin() && caller_id != review.reviewer_id {
            return Err(MarketError::NotAuthorized(format!(
                "user {caller_id} may not delete review {review_id}"
            )));
        }
        self.store().delete_review(review_id).await?;
        info!(review_id, caller_id, "review deleted");
        Ok(())
    }

    /// Reviews awaiting moderation, oldest first.
    pub async fn pending_reviews(&self, admin_id: Id) -> Result<Vec<Review>> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        Ok(self.store().reviews_with_status(ReviewStatus::Pending).await?)
    }

    pub async fn supplier_rating(&self, supplier_id: Id) -> Result<RatingSummary> {
        let supplier = load_user(self.store(), supplier_id).await?;
        rbac::require_role(&supplier, Role::Supplier)?;
        let reviews = self.store().reviews_for_supplier(supplier_id).await?;
        Ok(aggregate_rating(supplier_id, &reviews))
    }
}
