//! Registration and admin account management.

use tracing::info;

use crate::errors::{Entity, MarketError, Result};
use crate::events::{Notification, NotificationKind};
use crate::rbac::{self, load_user};
use crate::types::{AccountStatus, Id, NewUser, Role, User, VerificationStatus};
use crate::Marketplace;

impl Marketplace {
    /// Create a user with empty balances. Suppliers start `pending`.
    pub async fn register_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Result<User> {
        let name = name.into();
        let email = email.into();
        if name.trim().is_empty() {
            return Err(MarketError::InvalidInput("name must not be empty".into()));
        }
        if !email.contains('@') {
            return Err(MarketError::InvalidInput(format!("invalid email: {email}")));
        }

        let user = self
            .store()
            .insert_user(NewUser {
                name,
                email,
                role,
                verification_status: VerificationStatus::initial_for(role),
                created_at: self.now(),
            })
            .await?;
        info!(user_id = user.id, role = role.as_str(), "user registered");
        Ok(user)
    }

    pub async fn user(&self, id: Id) -> Result<User> {
        load_user(self.store(), id).await
    }

    /// All users; admin only.
    pub async fn users(&self, admin_id: Id) -> Result<Vec<User>> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        Ok(self.store().users().await?)
    }

    pub async fn set_verification_status(
        &self,
        admin_id: Id,
        supplier_id: Id,
        status: VerificationStatus,
    ) -> Result<User> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        let supplier = load_user(self.store(), supplier_id).await?;
        rbac::require_role(&supplier, Role::Supplier)?;
        if status == VerificationStatus::NotApplicable {
            return Err(MarketError::InvalidInput(
                "suppliers cannot be marked not_applicable".into(),
            ));
        }

        if !self
            .store()
            .update_user_status(supplier_id, supplier.account_status, status)
            .await?
        {
            return Err(MarketError::not_found(Entity::User, supplier_id));
        }
        info!(supplier_id, admin_id, status = status.as_str(), "verification changed");

        self.emit(Notification::new(
            supplier_id,
            NotificationKind::VerificationChanged,
            format!("Your verification status is now {status}"),
        ))
        .await;
        Ok(User {
            verification_status: status,
            ..supplier
        })
    }

    pub async fn set_account_status(
        &self,
        admin_id: Id,
        user_id: Id,
        status: AccountStatus,
    ) -> Result<User> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        if admin_id == user_id {
            return Err(MarketError::NotAuthorized(
                "admins cannot change their own account status".into(),
            ));
        }
        let user = load_user(self.store(), user_id).await?;

        if !self
            .store()
            .update_user_status(user_id, status, user.verification_status)
            .await?
        {
            return Err(MarketError::not_found(Entity::User, user_id));
        }
        info!(user_id, admin_id, status = status.as_str(), "account status changed");

        self.emit(Notification::new(
            user_id,
            NotificationKind::AccountStatusChanged,
            format!("Your account is now {status}"),
        ))
        .await;
        Ok(User {
            account_status: status,
            ..user
        })
    }

    /// Remove a user and clean up what references them.
    pub async fn remove_user(&self, admin_id: Id, user_id: Id) -> Result<()> {
        let admin = load_user(self.store(), admin_id).await?;
        rbac::require_admin(&admin)?;
        if admin_id == user_id {
            return Err(MarketError::NotAuthorized(
                "admins cannot remove themselves".into(),
            ));
        }
        load_user(self.store(), user_id).await?;

        self.store().delete_user(user_id).await?;
        info!(user_id, admin_id, "user removed");
        Ok(())
    }
}
