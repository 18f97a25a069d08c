//! Role and account-state guards shared by every entry point.

use crate::errors::{Entity, MarketError, Result};
use crate::storage::Store;
use crate::types::{Id, Role, User, VerificationStatus};

/// Load a user or fail with `NotFound`.
pub(crate) async fn load_user(store: &dyn Store, id: Id) -> Result<User> {
    store
        .user(id)
        .await?
        .ok_or_else(|| MarketError::not_found(Entity::User, id))
}

pub fn require_role(user: &User, role: Role) -> Result<()> {
    if user.role != role {
        return Err(MarketError::NotAuthorized(format!(
            "user {} is a {}, not a {}",
            user.id, user.role, role
        )));
    }
    Ok(())
}

pub fn require_admin(user: &User) -> Result<()> {
    require_role(user, Role::Admin)
}

pub fn require_active(user: &User) -> Result<()> {
    if !user.is_active() {
        return Err(MarketError::AccountNotEligible(format!(
            "user {} is blocked",
            user.id
        )));
    }
    Ok(())
}

/// Supplier role, active account, verified by an admin.
pub fn require_verified_supplier(user: &User) -> Result<()> {
    require_role(user, Role::Supplier)?;
    require_active(user)?;
    if user.verification_status != VerificationStatus::Verified {
        return Err(MarketError::AccountNotEligible(format!(
            "supplier {} is {}",
            user.id, user.verification_status
        )));
    }
    Ok(())
}
