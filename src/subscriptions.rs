use crate::errors::AppError;
use crate::models::{
    CompanySubscription, ExpiryWarningLevel, SubscriptionPlan, SubscriptionStatus,
    SubscriptionStatusInfo,
};
use crate::notifications::Notifier;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// The fields of a subscription + plan pair that gating decisions depend on.
///
/// Pure and clock-explicit so the funding logic is testable without a
/// database.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    pub end_date: Option<DateTime<Utc>>,
    pub is_unlimited: bool,
    pub credits_limit: Option<i64>,
    pub credits_used: i64,
}

impl SubscriptionSnapshot {
    pub fn from_parts(sub: &CompanySubscription, plan: &SubscriptionPlan) -> Self {
        Self {
            status: sub.status,
            end_date: sub.end_date,
            is_unlimited: plan.is_unlimited,
            credits_limit: plan.credits_limit,
            credits_used: sub.credits_used,
        }
    }

    /// True iff status is ACTIVE and `end_date` has not passed.
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.end_date.map(|end| now <= end).unwrap_or(false)
    }

    /// An ACTIVE row whose `end_date` has passed must be lazily persisted
    /// as EXPIRED by the caller.
    pub fn needs_lazy_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.end_date.map(|end| now > end).unwrap_or(false)
    }

    /// Active and on an unlimited plan.
    pub fn provides_unlimited_credits(&self, now: DateTime<Utc>) -> bool {
        self.is_currently_active(now) && self.is_unlimited
    }

    /// Whether `amount` credits can be consumed right now.
    ///
    /// Unlimited plans always can; metered plans iff the limit covers
    /// `credits_used + amount`. A metered plan with no limit configured
    /// can never consume.
    pub fn can_consume(&self, amount: i64, now: DateTime<Utc>) -> bool {
        if !self.is_currently_active(now) {
            return false;
        }
        if self.is_unlimited {
            return true;
        }
        match self.credits_limit {
            Some(limit) => self.credits_used + amount <= limit,
            None => false,
        }
    }
}

/// Whole days until `end_date`, clamped at zero.
pub fn days_until_expiry(end_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end_date - now).num_days().max(0)
}

/// Warning level for expiry notifications.
pub fn expiry_warning_level(days_remaining: i64) -> ExpiryWarningLevel {
    if days_remaining <= 3 {
        ExpiryWarningLevel::Critical
    } else if days_remaining <= 7 {
        ExpiryWarningLevel::High
    } else if days_remaining <= 15 {
        ExpiryWarningLevel::Medium
    } else {
        ExpiryWarningLevel::Low
    }
}

/// Subscription lifecycle service.
///
/// All transitions happen through explicit methods here — there are no
/// save-hook side effects. Notifications are dispatched after the row
/// change commits and never affect the outcome.
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The account's current ACTIVE subscription with its plan, applying
    /// lazy expiry: an ACTIVE row past its `end_date` is persisted as
    /// EXPIRED and reported as absent.
    pub async fn active_with_plan(
        &self,
        hr_profile_id: Uuid,
        notifier: &Notifier,
    ) -> Result<Option<(CompanySubscription, SubscriptionPlan)>, AppError> {
        let sub = sqlx::query_as::<_, CompanySubscription>(
            "SELECT * FROM company_subscriptions
             WHERE hr_profile_id = $1 AND status = 'ACTIVE'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(hr_profile_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sub) = sub else {
            return Ok(None);
        };

        let plan = self.plan_by_id(sub.plan_id).await?;
        let snapshot = SubscriptionSnapshot::from_parts(&sub, &plan);
        let now = Utc::now();

        if snapshot.needs_lazy_expiry(now) {
            self.mark_expired(&sub, &plan, notifier).await?;
            return Ok(None);
        }
        if !snapshot.is_currently_active(now) {
            return Ok(None);
        }

        Ok(Some((sub, plan)))
    }

    /// Comprehensive subscription status for an HR account.
    pub async fn status(
        &self,
        hr_profile_id: Uuid,
        notifier: &Notifier,
    ) -> Result<SubscriptionStatusInfo, AppError> {
        let active = self.active_with_plan(hr_profile_id, notifier).await?;

        let Some((sub, plan)) = active else {
            return Ok(SubscriptionStatusInfo {
                has_subscription: false,
                status: None,
                plan: None,
                plan_type: None,
                expires_at: None,
                days_remaining: None,
                is_unlimited: false,
                credits_used: 0,
                credits_limit: None,
                warning_level: None,
            });
        };

        let now = Utc::now();
        let days = sub.end_date.map(|end| days_until_expiry(end, now));

        Ok(SubscriptionStatusInfo {
            has_subscription: true,
            status: Some(sub.status),
            plan: Some(plan.name.clone()),
            plan_type: Some(plan.plan_type),
            expires_at: sub.end_date,
            days_remaining: days,
            is_unlimited: plan.is_unlimited,
            credits_used: sub.credits_used,
            credits_limit: plan.credits_limit,
            warning_level: days.map(expiry_warning_level),
        })
    }

    /// All plans currently open for purchase, cheapest first.
    pub async fn active_plans(&self) -> Result<Vec<SubscriptionPlan>, AppError> {
        let plans = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE is_active = true ORDER BY price ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    /// Creates a PENDING subscription request for admin approval.
    pub async fn request(
        &self,
        hr_profile_id: Uuid,
        plan_id: Uuid,
        payment_reference: Option<String>,
    ) -> Result<CompanySubscription, AppError> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".to_string()))?;

        if !plan.is_active {
            return Err(AppError::BadRequest(
                "This plan is no longer available".to_string(),
            ));
        }

        let sub = sqlx::query_as::<_, CompanySubscription>(
            "INSERT INTO company_subscriptions (hr_profile_id, plan_id, payment_reference)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(hr_profile_id)
        .bind(plan_id)
        .bind(payment_reference.unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            "Subscription {} requested by {} for plan '{}'",
            sub.id,
            hr_profile_id,
            plan.name
        );
        Ok(sub)
    }

    /// Admin approval: PENDING -> ACTIVE.
    ///
    /// Sets `start_date = now` and `end_date = now + plan duration`, and
    /// first expires any prior ACTIVE subscription of the same account so
    /// the one-ACTIVE-per-account unique index cannot be violated.
    pub async fn activate(
        &self,
        subscription_id: Uuid,
        notifier: &Notifier,
    ) -> Result<CompanySubscription, AppError> {
        let mut tx = self.pool.begin().await?;

        let sub = sqlx::query_as::<_, CompanySubscription>(
            "SELECT * FROM company_subscriptions WHERE id = $1 FOR UPDATE",
        )
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        if sub.status != SubscriptionStatus::Pending {
            return Err(AppError::BadRequest(
                "Only pending subscriptions can be activated".to_string(),
            ));
        }

        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1",
        )
        .bind(sub.plan_id)
        .fetch_one(&mut *tx)
        .await?;

        // A renewal replaces the previous subscription rather than stacking.
        sqlx::query(
            "UPDATE company_subscriptions
             SET status = 'EXPIRED', updated_at = now()
             WHERE hr_profile_id = $1 AND status = 'ACTIVE'",
        )
        .bind(sub.hr_profile_id)
        .execute(&mut *tx)
        .await?;

        let start = Utc::now();
        let end = start + Duration::days(plan.plan_type.duration_days());

        let activated = sqlx::query_as::<_, CompanySubscription>(
            "UPDATE company_subscriptions
             SET status = 'ACTIVE', start_date = $2, end_date = $3, updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(subscription_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Subscription {} activated for {} (plan '{}', valid till {})",
            activated.id,
            activated.hr_profile_id,
            plan.name,
            end
        );
        notifier.subscription_activated(activated.hr_profile_id, activated.id, &plan.name, end);

        Ok(activated)
    }

    /// Admin cancellation: PENDING|ACTIVE -> CANCELLED. Terminal.
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
        notifier: &Notifier,
    ) -> Result<CompanySubscription, AppError> {
        let mut tx = self.pool.begin().await?;

        let sub = sqlx::query_as::<_, CompanySubscription>(
            "SELECT * FROM company_subscriptions WHERE id = $1 FOR UPDATE",
        )
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        if sub.status != SubscriptionStatus::Pending && sub.status != SubscriptionStatus::Active {
            return Err(AppError::BadRequest(
                "Only pending or active subscriptions can be cancelled".to_string(),
            ));
        }

        let reason = reason.unwrap_or_default();
        let cancelled = sqlx::query_as::<_, CompanySubscription>(
            "UPDATE company_subscriptions
             SET status = 'CANCELLED', cancellation_reason = $2, updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(subscription_id)
        .bind(&reason)
        .fetch_one(&mut *tx)
        .await?;

        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1",
        )
        .bind(cancelled.plan_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Subscription {} cancelled: {}", cancelled.id, reason);
        notifier.subscription_cancelled(cancelled.hr_profile_id, cancelled.id, &plan.name, &reason);

        Ok(cancelled)
    }

    /// Bulk sweep: every ACTIVE subscription past its `end_date` becomes
    /// EXPIRED. Returns how many rows transitioned.
    pub async fn expire_old(&self, notifier: &Notifier) -> Result<u64, AppError> {
        let expired = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
            "UPDATE company_subscriptions
             SET status = 'EXPIRED', updated_at = now()
             WHERE status = 'ACTIVE' AND end_date IS NOT NULL AND end_date < now()
             RETURNING id, hr_profile_id, plan_id",
        )
        .fetch_all(&self.pool)
        .await?;

        for (id, hr_profile_id, plan_id) in &expired {
            let plan = self.plan_by_id(*plan_id).await?;
            notifier.subscription_expired(*hr_profile_id, *id, &plan.name);
        }

        Ok(expired.len() as u64)
    }

    /// Sends expiring-soon warnings for ACTIVE subscriptions 7, 3 and 1
    /// days from expiry, at most once per milestone per day.
    pub async fn send_expiry_warnings(&self, notifier: &Notifier) -> Result<u64, AppError> {
        let mut sent = 0u64;

        for days in [7i32, 3, 1] {
            let expiring = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, String)>(
                "SELECT cs.id, cs.hr_profile_id, cs.end_date, sp.name
                 FROM company_subscriptions cs
                 JOIN subscription_plans sp ON sp.id = cs.plan_id
                 WHERE cs.status = 'ACTIVE'
                   AND cs.end_date::date = (now() + make_interval(days => $1))::date",
            )
            .bind(days)
            .fetch_all(&self.pool)
            .await?;

            for (id, hr_profile_id, end_date, plan_name) in expiring {
                let already_sent: (bool,) = sqlx::query_as(
                    "SELECT EXISTS (
                         SELECT 1 FROM user_notifications
                         WHERE hr_profile_id = $1
                           AND data_payload->>'subscription_id' = $2
                           AND (data_payload->>'days_remaining')::int = $3
                           AND created_at::date = now()::date
                     )",
                )
                .bind(hr_profile_id)
                .bind(id.to_string())
                .bind(days)
                .fetch_one(&self.pool)
                .await?;

                if !already_sent.0 {
                    notifier.subscription_expiring(
                        hr_profile_id,
                        id,
                        &plan_name,
                        i64::from(days),
                        end_date,
                    );
                    sent += 1;
                }
            }
        }

        Ok(sent)
    }

    async fn plan_by_id(&self, plan_id: Uuid) -> Result<SubscriptionPlan, AppError> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(plan)
    }

    async fn mark_expired(
        &self,
        sub: &CompanySubscription,
        plan: &SubscriptionPlan,
        notifier: &Notifier,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            "UPDATE company_subscriptions
             SET status = 'EXPIRED', updated_at = now()
             WHERE id = $1 AND status = 'ACTIVE'",
        )
        .bind(sub.id)
        .execute(&self.pool)
        .await?;

        // A concurrent request may have expired it first; notify once.
        if updated.rows_affected() == 1 {
            tracing::info!("Subscription {} lazily expired", sub.id);
            notifier.subscription_expired(sub.hr_profile_id, sub.id, &plan.name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        status: SubscriptionStatus,
        end_in_days: Option<i64>,
        is_unlimited: bool,
        credits_limit: Option<i64>,
        credits_used: i64,
    ) -> (SubscriptionSnapshot, DateTime<Utc>) {
        let now = Utc::now();
        let snap = SubscriptionSnapshot {
            status,
            end_date: end_in_days.map(|d| now + Duration::days(d)),
            is_unlimited,
            credits_limit,
            credits_used,
        };
        (snap, now)
    }

    #[test]
    fn active_with_future_end_date_is_active() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(10), true, None, 0);
        assert!(snap.is_currently_active(now));
        assert!(!snap.needs_lazy_expiry(now));
    }

    #[test]
    fn active_past_end_date_needs_lazy_expiry() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(-1), true, None, 0);
        assert!(!snap.is_currently_active(now));
        assert!(snap.needs_lazy_expiry(now));
    }

    #[test]
    fn non_active_statuses_are_never_active() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Cancelled,
        ] {
            let (snap, now) = snapshot(status, Some(10), true, None, 0);
            assert!(!snap.is_currently_active(now));
            assert!(!snap.needs_lazy_expiry(now));
        }
    }

    #[test]
    fn active_without_end_date_is_not_active() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, None, true, None, 0);
        assert!(!snap.is_currently_active(now));
        assert!(!snap.needs_lazy_expiry(now));
    }

    #[test]
    fn unlimited_plan_always_consumes_while_active() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(5), true, None, 0);
        assert!(snap.provides_unlimited_credits(now));
        assert!(snap.can_consume(1_000_000, now));
    }

    #[test]
    fn metered_plan_consumes_up_to_the_limit() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(5), false, Some(100), 90);
        assert!(!snap.provides_unlimited_credits(now));
        assert!(snap.can_consume(10, now));
        assert!(!snap.can_consume(11, now));
    }

    #[test]
    fn metered_plan_without_limit_cannot_consume() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(5), false, None, 0);
        assert!(!snap.can_consume(1, now));
    }

    #[test]
    fn expired_subscription_cannot_consume_even_unlimited() {
        let (snap, now) = snapshot(SubscriptionStatus::Active, Some(-2), true, None, 0);
        assert!(!snap.provides_unlimited_credits(now));
        assert!(!snap.can_consume(1, now));
    }

    #[test]
    fn days_until_expiry_clamps_at_zero() {
        let now = Utc::now();
        assert_eq!(days_until_expiry(now + Duration::days(9), now), 9);
        assert_eq!(days_until_expiry(now - Duration::days(3), now), 0);
    }

    #[test]
    fn warning_levels_match_thresholds() {
        assert_eq!(expiry_warning_level(0), ExpiryWarningLevel::Critical);
        assert_eq!(expiry_warning_level(3), ExpiryWarningLevel::Critical);
        assert_eq!(expiry_warning_level(4), ExpiryWarningLevel::High);
        assert_eq!(expiry_warning_level(7), ExpiryWarningLevel::High);
        assert_eq!(expiry_warning_level(8), ExpiryWarningLevel::Medium);
        assert_eq!(expiry_warning_level(15), ExpiryWarningLevel::Medium);
        assert_eq!(expiry_warning_level(16), ExpiryWarningLevel::Low);
    }
}
