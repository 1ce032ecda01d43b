use crate::candidates::CandidateDirectory;
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CancelSubscriptionRequest, CandidateQueryParams, CreditSettings, HrProfile, RechargeRequest,
    SubscriptionRequest, UnlockResponse, UserNotification, WalletSummary,
};
use crate::notifications::Notifier;
use crate::subscriptions::SubscriptionService;
use crate::unlock::UnlockGate;
use crate::wallet::WalletService;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use moka::future::Cache;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub notifier: Notifier,
    pub settings_cache: Cache<u8, CreditSettings>,
}

impl AppState {
    fn wallets(&self) -> WalletService {
        WalletService::new(self.pool.clone(), self.settings_cache.clone())
    }

    fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.pool.clone())
    }

    fn directory(&self) -> CandidateDirectory {
        CandidateDirectory::new(self.pool.clone())
    }

    fn unlock_gate(&self) -> UnlockGate {
        UnlockGate::new(self.pool.clone())
    }
}

/// Resolves the calling HR account from the `x-account-id` header.
async fn require_account(state: &AppState, headers: &HeaderMap) -> Result<HrProfile, AppError> {
    let account_id = headers
        .get("x-account-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing x-account-id header".to_string()))?;

    let account_id = Uuid::parse_str(account_id)
        .map_err(|_| AppError::Unauthorized("Invalid x-account-id header".to_string()))?;

    let profile = sqlx::query_as::<_, HrProfile>("SELECT * FROM hr_profiles WHERE id = $1")
        .bind(account_id)
        .fetch_optional(&state.pool)
        .await
        .context("Failed to load HR profile")?
        .ok_or_else(|| AppError::Unauthorized("Unknown account".to_string()))?;

    Ok(profile)
}

/// Admin endpoints authenticate with a static API key instead of an account.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() || provided != state.config.admin_api_key {
        return Err(AppError::Unauthorized("Invalid admin API key".to_string()));
    }
    Ok(())
}

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "talentgate-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- Wallet ----

/// GET /api/v1/wallet — balance plus subscription summary. Provisions an
/// empty wallet on first call.
pub async fn get_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WalletSummary>, AppError> {
    let account = require_account(&state, &headers).await?;

    let wallet = state.wallets().get_or_create(account.id).await?;
    let subscription = state
        .subscriptions()
        .status(account.id, &state.notifier)
        .await?;

    Ok(Json(WalletSummary {
        success: true,
        wallet,
        subscription,
    }))
}

/// POST /api/v1/wallet/recharge
pub async fn recharge_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RechargeRequest>,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let wallet = state
        .wallets()
        .recharge(account.id, payload.credits, payload.payment_reference)
        .await?;

    state
        .notifier
        .wallet_recharged(account.id, payload.credits, wallet.balance);

    Ok(Json(json!({
        "success": true,
        "message": format!("Wallet recharged with {} credits", payload.credits),
        "wallet": wallet,
    })))
}

/// GET /api/v1/wallet/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let transactions = state.wallets().transactions(account.id).await?;

    Ok(Json(json!({
        "success": true,
        "count": transactions.len(),
        "transactions": transactions,
    })))
}

// ---- Candidates ----

/// GET /api/v1/candidates — filtered directory, masked unless unlocked.
pub async fn list_candidates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CandidateQueryParams>,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let candidates = state.directory().list(account.id, &params).await?;

    Ok(Json(json!({
        "success": true,
        "count": candidates.len(),
        "candidates": candidates,
    })))
}

/// GET /api/v1/candidates/:id
pub async fn get_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let candidate = state.directory().get(account.id, candidate_id).await?;

    Ok(Json(json!({
        "success": true,
        "candidate": candidate,
    })))
}

/// GET /api/v1/candidates/unlocked
pub async fn list_unlocked_candidates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let unlocked = state.directory().unlocked(account.id).await?;

    Ok(Json(json!({
        "success": true,
        "count": unlocked.len(),
        "candidates": unlocked,
    })))
}

/// POST /api/v1/candidates/:id/unlock
///
/// The unlock price comes from the admin-managed credit settings, read
/// through a short-lived cache.
pub async fn unlock_candidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<UnlockResponse>, AppError> {
    let account = require_account(&state, &headers).await?;

    let settings = state.wallets().credit_settings().await?;
    let response = state
        .unlock_gate()
        .unlock(
            account.id,
            candidate_id,
            settings.unlock_credits_required,
            &state.notifier,
        )
        .await?;

    Ok(Json(response))
}

// ---- Subscriptions ----

/// GET /api/v1/subscriptions/plans
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let plans = state.subscriptions().active_plans().await?;

    Ok(Json(json!({
        "success": true,
        "count": plans.len(),
        "plans": plans,
    })))
}

/// POST /api/v1/subscriptions — creates a PENDING request for admin approval.
pub async fn request_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubscriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let subscription = state
        .subscriptions()
        .request(account.id, payload.plan_id, payload.payment_reference)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription requested. It will be activated after payment verification.",
        "subscription": subscription,
    })))
}

/// GET /api/v1/subscriptions/current — the active subscription with its plan.
pub async fn current_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let current = state
        .subscriptions()
        .active_with_plan(account.id, &state.notifier)
        .await?;

    match current {
        Some((subscription, plan)) => Ok(Json(json!({
            "success": true,
            "subscription": subscription,
            "plan": plan,
        }))),
        None => Ok(Json(json!({
            "success": true,
            "subscription": Value::Null,
            "plan": Value::Null,
        }))),
    }
}

/// GET /api/v1/subscriptions/status
pub async fn subscription_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let status = state
        .subscriptions()
        .status(account.id, &state.notifier)
        .await?;

    Ok(Json(json!({
        "success": true,
        "subscription": status,
    })))
}

// ---- Notifications ----

/// GET /api/v1/notifications — the caller's in-app notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let notifications = sqlx::query_as::<_, UserNotification>(
        "SELECT * FROM user_notifications
         WHERE hr_profile_id = $1
         ORDER BY created_at DESC
         LIMIT 100",
    )
    .bind(account.id)
    .fetch_all(&state.pool)
    .await?;

    let unread = notifications.iter().filter(|n| !n.is_read).count();

    Ok(Json(json!({
        "success": true,
        "count": notifications.len(),
        "unread_count": unread,
        "notifications": notifications,
    })))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let account = require_account(&state, &headers).await?;

    let updated = sqlx::query(
        "UPDATE user_notifications SET is_read = true
         WHERE id = $1 AND hr_profile_id = $2",
    )
    .bind(notification_id)
    .bind(account.id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Notification marked as read",
    })))
}

// ---- Admin ----

/// POST /api/v1/admin/subscriptions/:id/activate
pub async fn activate_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let subscription = state
        .subscriptions()
        .activate(subscription_id, &state.notifier)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription activated",
        "subscription": subscription,
    })))
}

/// POST /api/v1/admin/subscriptions/:id/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<CancelSubscriptionRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let subscription = state
        .subscriptions()
        .cancel(subscription_id, payload.reason, &state.notifier)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription cancelled",
        "subscription": subscription,
    })))
}
