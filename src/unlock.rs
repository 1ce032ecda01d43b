use crate::errors::AppError;
use crate::models::{
    Candidate, CompanySubscription, FullCandidate, SubscriptionPlan, UnlockRecord, UnlockResponse,
    Wallet,
};
use crate::notifications::Notifier;
use crate::subscriptions::SubscriptionSnapshot;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Which pool of credits pays for an unlock.
///
/// Priority order is fixed: an active unlimited subscription, then an
/// active metered subscription with room for the full charge, then the
/// wallet balance. Funding is all-or-nothing per source — a metered
/// subscription with some-but-insufficient remaining credits is skipped
/// entirely in favor of the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingSource {
    UnlimitedSubscription,
    MeteredSubscription,
    WalletBalance,
}

/// Outcome of the funding decision for one unlock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingDecision {
    Funded(FundingSource),
    Insufficient { required: i64, balance: i64 },
}

/// Picks the funding source for an unlock costing `credits_required`.
///
/// Pure: operates on a wallet balance and a subscription snapshot taken
/// under row locks, so the decision is reproducible in tests without a
/// database.
pub fn decide_funding(
    wallet_balance: i64,
    subscription: Option<&SubscriptionSnapshot>,
    credits_required: i64,
    now: DateTime<Utc>,
) -> FundingDecision {
    if let Some(sub) = subscription {
        if sub.provides_unlimited_credits(now) {
            return FundingDecision::Funded(FundingSource::UnlimitedSubscription);
        }
        if sub.can_consume(credits_required, now) {
            return FundingDecision::Funded(FundingSource::MeteredSubscription);
        }
    }

    if wallet_balance >= credits_required {
        FundingDecision::Funded(FundingSource::WalletBalance)
    } else {
        FundingDecision::Insufficient {
            required: credits_required,
            balance: wallet_balance,
        }
    }
}

/// The unlock gate: decides whether an HR account may unlock a candidate
/// and performs the deduction, all inside one database transaction.
///
/// Unlocking is idempotent per (account, candidate): the unique constraint
/// on `unlock_history` is the safety net against racing requests, and a
/// request that loses the insert race rolls back its deduction and returns
/// the already-unlocked response.
pub struct UnlockGate {
    pool: PgPool,
}

/// Subscription state captured under lock.
struct LockedSubscription {
    id: Uuid,
    snapshot: SubscriptionSnapshot,
}

impl UnlockGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Unlocks `candidate_id` for `hr_profile_id`, charging
    /// `credits_required` credits from the best available funding source.
    ///
    /// All reads and writes happen in a single transaction with the wallet
    /// and subscription rows locked `FOR UPDATE`; any failure leaves every
    /// row untouched. The success notification is dispatched only after
    /// commit and cannot roll the unlock back.
    pub async fn unlock(
        &self,
        hr_profile_id: Uuid,
        candidate_id: Uuid,
        credits_required: i64,
        notifier: &Notifier,
    ) -> Result<UnlockResponse, AppError> {
        if credits_required <= 0 {
            return Err(AppError::InternalError(format!(
                "Invalid unlock price configured: {}",
                credits_required
            )));
        }

        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, Candidate>(
            "SELECT * FROM candidates WHERE id = $1 AND is_active = true",
        )
        .bind(candidate_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;

        // Idempotent fast path: re-unlocking is a free no-op.
        let existing = sqlx::query_as::<_, UnlockRecord>(
            "SELECT * FROM unlock_history WHERE hr_profile_id = $1 AND candidate_id = $2",
        )
        .bind(hr_profile_id)
        .bind(candidate_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Ok(already_unlocked_response(&candidate));
        }

        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE hr_profile_id = $1 FOR UPDATE",
        )
        .bind(hr_profile_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::WalletNotFound)?;

        let now = Utc::now();
        let (subscription, lazily_expired) =
            self.lock_active_subscription(&mut tx, hr_profile_id, now).await?;

        let decision = decide_funding(
            wallet.balance,
            subscription.as_ref().map(|s| &s.snapshot),
            credits_required,
            now,
        );

        let source = match decision {
            FundingDecision::Funded(source) => source,
            FundingDecision::Insufficient { required, balance } => {
                // The rollback also undoes any lazy expiry recorded above,
                // so no expiry notification goes out here; the next read or
                // the hourly sweep persists the transition and notifies once.
                tx.rollback().await?;
                return Err(AppError::InsufficientCredits { required, balance });
            }
        };

        let remaining_balance = match source {
            FundingSource::UnlimitedSubscription => {
                // No balance change; total_spent still tracks the audit trail.
                sqlx::query(
                    "UPDATE wallets SET total_spent = total_spent + $1, updated_at = now()
                     WHERE id = $2",
                )
                .bind(credits_required)
                .bind(wallet.id)
                .execute(&mut *tx)
                .await?;
                wallet.balance
            }
            FundingSource::MeteredSubscription => {
                let sub = subscription
                    .as_ref()
                    .ok_or_else(|| AppError::InternalError("Funding decision without subscription".to_string()))?;
                sqlx::query(
                    "UPDATE company_subscriptions
                     SET credits_used = credits_used + $1, updated_at = now()
                     WHERE id = $2",
                )
                .bind(credits_required)
                .bind(sub.id)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE wallets SET total_spent = total_spent + $1, updated_at = now()
                     WHERE id = $2",
                )
                .bind(credits_required)
                .bind(wallet.id)
                .execute(&mut *tx)
                .await?;
                wallet.balance
            }
            FundingSource::WalletBalance => {
                debug_assert!(wallet.can_deduct(credits_required));
                let updated = sqlx::query(
                    "UPDATE wallets
                     SET balance = balance - $1, total_spent = total_spent + $1, updated_at = now()
                     WHERE id = $2 AND balance >= $1",
                )
                .bind(credits_required)
                .bind(wallet.id)
                .execute(&mut *tx)
                .await?;
                // The row is locked, so the guard can only fail if the
                // decision and the update disagree.
                if updated.rows_affected() != 1 {
                    return Err(AppError::InternalError(
                        "Wallet deduction failed under lock".to_string(),
                    ));
                }
                wallet.balance - credits_required
            }
        };

        // The unique constraint is the last line of defense against a
        // racing unlock that slipped past the fast path. Losing the insert
        // rolls back the deduction above.
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO unlock_history (hr_profile_id, candidate_id, credits_used)
             VALUES ($1, $2, $3)
             ON CONFLICT (hr_profile_id, candidate_id) DO NOTHING
             RETURNING id",
        )
        .bind(hr_profile_id)
        .bind(candidate_id)
        .bind(credits_required)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            tracing::info!(
                "Unlock race lost for ({}, {}); deduction rolled back",
                hr_profile_id,
                candidate_id
            );
            return Ok(already_unlocked_response(&candidate));
        }

        sqlx::query(
            "INSERT INTO wallet_transactions (wallet_id, transaction_type, credits_used, description)
             VALUES ($1, 'UNLOCK', $2, $3)",
        )
        .bind(wallet.id)
        .bind(credits_required)
        .bind(format!("Unlocked candidate: {}", candidate.masked_name))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Candidate {} unlocked by {} via {:?} ({} credits, balance {})",
            candidate_id,
            hr_profile_id,
            source,
            credits_required,
            remaining_balance
        );

        if let Some((sub_id, plan_name)) = lazily_expired {
            notifier.subscription_expired(hr_profile_id, sub_id, &plan_name);
        }
        notifier.profile_unlocked(
            hr_profile_id,
            candidate.id,
            &candidate.masked_name,
            credits_required,
        );

        Ok(UnlockResponse {
            success: true,
            message: "Profile unlocked successfully".to_string(),
            candidate: FullCandidate::from(&candidate),
            credits_used: Some(credits_required),
            remaining_balance: Some(remaining_balance),
            already_unlocked: false,
        })
    }

    /// Locks the account's ACTIVE subscription row (if any) and snapshots
    /// it. An ACTIVE row past `end_date` is persisted as EXPIRED inside the
    /// same transaction; the returned pair carries it so the caller can
    /// notify after commit.
    async fn lock_active_subscription(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        hr_profile_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Option<LockedSubscription>, Option<(Uuid, String)>), AppError> {
        let sub = sqlx::query_as::<_, CompanySubscription>(
            "SELECT * FROM company_subscriptions
             WHERE hr_profile_id = $1 AND status = 'ACTIVE'
             ORDER BY created_at DESC LIMIT 1
             FOR UPDATE",
        )
        .bind(hr_profile_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(sub) = sub else {
            return Ok((None, None));
        };

        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1",
        )
        .bind(sub.plan_id)
        .fetch_one(&mut **tx)
        .await?;

        let snapshot = SubscriptionSnapshot::from_parts(&sub, &plan);

        if snapshot.needs_lazy_expiry(now) {
            sqlx::query(
                "UPDATE company_subscriptions SET status = 'EXPIRED', updated_at = now()
                 WHERE id = $1",
            )
            .bind(sub.id)
            .execute(&mut **tx)
            .await?;
            return Ok((None, Some((sub.id, plan.name))));
        }

        Ok((
            Some(LockedSubscription {
                id: sub.id,
                snapshot,
            }),
            None,
        ))
    }
}

fn already_unlocked_response(candidate: &Candidate) -> UnlockResponse {
    UnlockResponse {
        success: true,
        message: "Already unlocked".to_string(),
        candidate: FullCandidate::from(candidate),
        credits_used: None,
        remaining_balance: None,
        already_unlocked: true,
    }
}
