//! Typed failures of the marketplace core.
//!
//! Every variant is recoverable. A failed operation leaves all entities in
//! their prior valid state.

use thiserror::Error;

use crate::types::{Amount, Id};

/// Failure reported by a [`Store`](crate::storage::Store) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or the call failed in transit.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint or conditional write rejected the change.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// A persisted record could not be mapped into a valid entity.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    User,
    Project,
    Bid,
    Review,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::User => "user",
            Entity::Project => "project",
            Entity::Bid => "bid",
            Entity::Review => "review",
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("invalid amount: {0}")]
    InvalidAmount(Amount),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("account not eligible: {0}")]
    AccountNotEligible(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Id },

    #[error("user {from} may not message user {to}")]
    CommunicationNotAuthorized { from: Id, to: Id },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarketError {
    pub fn not_found(entity: Entity, id: Id) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_transition(reason: impl Into<String>) -> Self {
        Self::InvalidStateTransition(reason.into())
    }

    /// Stable snake_case identifier for API payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotAuthorized(_) => "not_authorized",
            Self::AccountNotEligible(_) => "account_not_eligible",
            Self::InvalidStateTransition(_) => "invalid_state_transition",
            Self::NotFound { .. } => "not_found",
            Self::CommunicationNotAuthorized { .. } => "communication_not_authorized",
            Self::Store(StoreError::Unavailable(_)) => "store_unavailable",
            Self::Store(StoreError::Conflict(_)) => "store_conflict",
            Self::Store(StoreError::Corrupt(_)) => "store_corrupt",
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
