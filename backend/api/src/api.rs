//! Axum REST API: request shapes, caller identity, error mapping, handlers.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use marketplace_core::{
    AccountStatus, Amount, Id, MarketError, Marketplace, Ratings, ReviewStatus, Role, StoreError,
    Timestamp, User, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::ApiError;

/// Header carrying the acting user's id.
pub const CALLER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct ApiState {
    pub market: Marketplace,
    pub pool: SqlitePool,
}

/// All routes, without middleware layers.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(register_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/top-up", post(top_up))
        .route("/users/:id/transactions", get(get_transactions))
        .route("/users/:id/notifications", get(get_notifications))
        .route("/users/:id/rating", get(get_rating))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", delete(remove_user))
        .route("/admin/users/:id/credit", post(admin_credit))
        .route("/admin/users/:id/verification", post(set_verification))
        .route("/admin/users/:id/status", post(set_account_status))
        .route("/admin/reviews/pending", get(pending_reviews))
        .route("/admin/reviews/:id/status", post(set_review_status))
        .route("/projects", get(my_projects).post(create_project))
        .route("/projects/:id", get(get_project).delete(delete_project))
        .route("/projects/:id/bids", post(place_bid))
        .route("/projects/:id/accept", post(accept_bid))
        .route("/projects/:id/complete", post(mark_complete))
        .route("/projects/:id/review", post(submit_review))
        .route("/reviews/:id", delete(delete_review))
        .route("/messages", post(send_message))
        .route("/messages/:peer", get(fetch_messages))
        .with_state(state)
}

/// Register an admin with `email` unless one exists. Fails when the email
/// already belongs to a non-admin.
pub async fn ensure_admin(market: &Marketplace, email: &str) -> Result<User, MarketError> {
    if let Some(existing) = market
        .store()
        .users()
        .await?
        .into_iter()
        .find(|u| u.email == email)
    {
        if !existing.is_admin() {
            return Err(MarketError::NotAuthorized(format!(
                "bootstrap admin email {email} belongs to non-admin user {}",
                existing.id
            )));
        }
        return Ok(existing);
    }
    let admin = market.register_user("Administrator", email, Role::Admin).await?;
    info!(user_id = admin.id, "Bootstrap admin created");
    Ok(admin)
}

// ─────────────────────────────────────────────────────────
// Caller identity
// ─────────────────────────────────────────────────────────

/// The acting user, from the `X-User-Id` header.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Id);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| ApiFailure::Unauthenticated("missing X-User-Id header".into()))?;
        raw.to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Caller)
            .ok_or_else(|| ApiFailure::Unauthenticated("malformed X-User-Id header".into()))
    }
}

async fn require_self_or_admin(market: &Marketplace, caller: Id, target: Id) -> HandlerResult<()> {
    if caller == target || market.user(caller).await?.is_admin() {
        Ok(())
    } else {
        Err(MarketError::NotAuthorized(format!("user {caller} may not act for user {target}")).into())
    }
}

// ─────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiFailure {
    Market(MarketError),
    Unauthenticated(String),
    Internal(String),
}

impl From<MarketError> for ApiFailure {
    fn from(e: MarketError) -> Self {
        Self::Market(e)
    }
}

impl From<ApiError> for ApiFailure {
    fn from(e: ApiError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

pub fn status_for(e: &MarketError) -> StatusCode {
    match e {
        MarketError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        MarketError::InvalidAmount(_) | MarketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MarketError::NotAuthorized(_)
        | MarketError::AccountNotEligible(_)
        | MarketError::CommunicationNotAuthorized { .. } => StatusCode::FORBIDDEN,
        MarketError::InvalidStateTransition(_) => StatusCode::CONFLICT,
        MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
        MarketError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        MarketError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        MarketError::Store(StoreError::Corrupt(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiFailure::Market(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    error!(kind = e.kind(), "Request failed: {e}");
                } else {
                    warn!(kind = e.kind(), "Request rejected: {e}");
                }
                (
                    status,
                    ErrorResponse {
                        error: e.to_string(),
                        kind: e.kind(),
                    },
                )
            }
            ApiFailure::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: msg,
                    kind: "unauthenticated",
                },
            ),
            ApiFailure::Internal(msg) => {
                error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: msg,
                        kind: "internal",
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type HandlerResult<T> = Result<T, ApiFailure>;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct CreditRequest {
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub status: VerificationStatus,
}

#[derive(Deserialize)]
pub struct AccountStatusRequest {
    pub status: AccountStatus,
}

#[derive(Deserialize)]
pub struct ReviewStatusRequest {
    pub status: ReviewStatus,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: Amount,
}

#[derive(Deserialize)]
pub struct BidRequest {
    pub amount: Amount,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub bid_id: Id,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub ratings: Ratings,
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub recipient_id: Id,
    pub body: String,
}

#[derive(Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: Timestamp,
}

// ─────────────────────────────────────────────────────────
// Handlers: users and ledger
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /users`
///
/// Open registration for customers and suppliers. Creating an admin requires
/// an admin caller.
pub async fn register_user(
    State(state): State<Arc<ApiState>>,
    caller: Option<Caller>,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<impl IntoResponse> {
    if req.role == Role::Admin {
        let is_admin = match caller {
            Some(Caller(id)) => state.market.user(id).await?.is_admin(),
            None => false,
        };
        if !is_admin {
            return Err(MarketError::NotAuthorized("only admins may create admins".into()).into());
        }
    }
    let user = state
        .market
        .register_user(req.name, req.email, req.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/:id`
pub async fn get_user(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    require_self_or_admin(&state.market, caller, id).await?;
    Ok(Json(state.market.user(id).await?))
}

/// `POST /users/:id/top-up`
pub async fn top_up(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<AmountRequest>,
) -> HandlerResult<impl IntoResponse> {
    if caller != id {
        return Err(MarketError::NotAuthorized("users may only top up their own balance".into()).into());
    }
    Ok(Json(state.market.top_up(id, req.amount).await?))
}

/// `GET /users/:id/transactions`
pub async fn get_transactions(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    require_self_or_admin(&state.market, caller, id).await?;
    Ok(Json(state.market.transactions(id).await?))
}

/// `GET /users/:id/notifications`
pub async fn get_notifications(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    require_self_or_admin(&state.market, caller, id).await?;
    Ok(Json(db::notifications_for(&state.pool, id).await?))
}

/// `GET /users/:id/rating`
pub async fn get_rating(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.supplier_rating(id).await?))
}

// ─────────────────────────────────────────────────────────
// Handlers: admin
// ─────────────────────────────────────────────────────────

/// `GET /admin/users`
pub async fn list_users(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.users(caller).await?))
}

/// `DELETE /admin/users/:id`
pub async fn remove_user(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<StatusCode> {
    state.market.remove_user(caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/users/:id/credit`
pub async fn admin_credit(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<CreditRequest>,
) -> HandlerResult<impl IntoResponse> {
    let description = req
        .description
        .unwrap_or_else(|| "Administrative credit".to_string());
    Ok(Json(
        state
            .market
            .admin_credit(caller, id, req.amount, description)
            .await?,
    ))
}

/// `POST /admin/users/:id/verification`
pub async fn set_verification(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<VerificationRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .market
            .set_verification_status(caller, id, req.status)
            .await?,
    ))
}

/// `POST /admin/users/:id/status`
pub async fn set_account_status(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<AccountStatusRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .market
            .set_account_status(caller, id, req.status)
            .await?,
    ))
}

/// `GET /admin/reviews/pending`
pub async fn pending_reviews(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.pending_reviews(caller).await?))
}

/// `POST /admin/reviews/:id/status`
pub async fn set_review_status(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<ReviewStatusRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .market
            .set_review_status(id, req.status, caller)
            .await?,
    ))
}

// ─────────────────────────────────────────────────────────
// Handlers: projects, bids, reviews
// ─────────────────────────────────────────────────────────

/// `GET /projects`
///
/// Projects the caller owns or was awarded.
pub async fn my_projects(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.projects_for_user(caller).await?))
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Json(req): Json<CreateProjectRequest>,
) -> HandlerResult<impl IntoResponse> {
    let project = state
        .market
        .create_project(caller, req.title, req.description, req.budget)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.project_details(id).await?))
}

/// `DELETE /projects/:id`
pub async fn delete_project(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<StatusCode> {
    state.market.delete_project(id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /projects/:id/bids`
pub async fn place_bid(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<BidRequest>,
) -> HandlerResult<impl IntoResponse> {
    let bid = state
        .market
        .place_bid(id, caller, req.amount, req.message)
        .await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// `POST /projects/:id/accept`
pub async fn accept_bid(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<AcceptRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.accept_bid(id, req.bid_id, caller).await?))
}

/// `POST /projects/:id/complete`
pub async fn mark_complete(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.market.mark_complete(id, caller).await?))
}

/// `POST /projects/:id/review`
pub async fn submit_review(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
    Json(req): Json<ReviewRequest>,
) -> HandlerResult<impl IntoResponse> {
    let review = state
        .market
        .submit_review(id, caller, req.ratings, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `DELETE /reviews/:id`
pub async fn delete_review(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(id): Path<Id>,
) -> HandlerResult<StatusCode> {
    state.market.delete_review(id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────
// Handlers: messaging
// ─────────────────────────────────────────────────────────

/// `POST /messages`
pub async fn send_message(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Json(req): Json<MessageRequest>,
) -> HandlerResult<impl IntoResponse> {
    let message = state
        .market
        .send_message(caller, req.recipient_id, req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /messages/:peer?since=<millis>`
///
/// Messages exchanged with `peer` after `since`, oldest first. Clients poll
/// with the timestamp of the last message they hold.
pub async fn fetch_messages(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    Path(peer): Path<Id>,
    Query(query): Query<SinceQuery>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .market
            .fetch_since(caller, peer, query.since)
            .await?,
    ))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
