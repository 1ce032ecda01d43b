use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A recruiter account — the entity spending credits to view candidates.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HrProfile {
    /// Unique identifier for the account.
    pub id: Uuid,
    /// Company the recruiter belongs to.
    pub company_name: String,
    /// Contact email for the account.
    pub contact_email: String,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// A candidate profile. Served masked until an HR account unlocks it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier for the candidate.
    pub id: Uuid,
    /// Full legal name (only visible after unlock).
    pub full_name: String,
    /// Shortened display name shown before unlock.
    pub masked_name: String,
    /// Phone number (only visible after unlock).
    pub phone: String,
    /// Email address (only visible after unlock).
    pub email: String,
    /// Age in years.
    pub age: i32,
    /// Role / designation (e.g. "Backend Engineer").
    pub role: String,
    /// Total years of professional experience.
    pub experience_years: i32,
    /// Current annual compensation.
    pub current_ctc: Option<BigDecimal>,
    /// Expected annual compensation.
    pub expected_ctc: Option<BigDecimal>,
    /// City of residence.
    pub city: Option<String>,
    /// State of residence.
    pub state: Option<String>,
    /// Comma-separated skills.
    pub skills: String,
    /// Highest education level.
    pub education: Option<String>,
    /// Inactive candidates are hidden from the directory and cannot be unlocked.
    pub is_active: bool,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    /// Splits the comma-separated `skills` column into trimmed entries.
    pub fn skills_list(&self) -> Vec<String> {
        self.skills
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Per-account credit ledger. One row per HR account.
///
/// Mutated only by recharges (balance up) and unlock deductions
/// (balance down, total_spent up). `balance >= 0` is also enforced
/// by a CHECK constraint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique identifier for the wallet.
    pub id: Uuid,
    /// Owning HR account (1:1).
    pub hr_profile_id: Uuid,
    /// Spendable credit balance. Never negative.
    pub balance: i64,
    /// Lifetime credits spent, including subscription-funded unlocks
    /// (audit trail). Never decreases.
    pub total_spent: i64,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Whether the balance covers a deduction of `amount` credits.
    pub fn can_deduct(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Ledger transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Recharge,
    Unlock,
    Refund,
}

/// Immutable append-only ledger entry, created alongside every wallet
/// mutation. Never updated or deleted in normal operation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique identifier for the transaction.
    pub id: Uuid,
    /// The wallet this entry belongs to.
    pub wallet_id: Uuid,
    /// What kind of mutation this records.
    pub transaction_type: TransactionType,
    /// Credits added (recharges/refunds).
    pub credits_added: i64,
    /// Credits consumed (unlocks).
    pub credits_used: i64,
    /// External payment reference, if any.
    pub reference_id: String,
    /// Human-readable description of the mutation.
    pub description: String,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// Subscription billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
}

impl PlanType {
    /// Plan duration in days, used to derive `end_date` on activation.
    pub fn duration_days(&self) -> i64 {
        match self {
            PlanType::Monthly => 30,
            PlanType::Quarterly => 90,
            PlanType::HalfYearly => 180,
            PlanType::Yearly => 365,
        }
    }
}

/// Immutable reference data describing a purchasable subscription plan.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Unique identifier for the plan.
    pub id: Uuid,
    /// Display name (e.g. "Unlimited Monthly Plan").
    pub name: String,
    /// Plan description for admin reference.
    pub description: String,
    /// Billing period.
    pub plan_type: PlanType,
    /// Plan price.
    pub price: BigDecimal,
    /// If true, the plan grants unlimited unlocks.
    pub is_unlimited: bool,
    /// Credit limit for metered plans (NULL for unlimited).
    pub credits_limit: Option<i64>,
    /// Only active plans can be requested.
    pub is_active: bool,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

/// Subscription lifecycle state.
///
/// PENDING -> ACTIVE (admin approval), ACTIVE -> EXPIRED (date-based),
/// ACTIVE|PENDING -> CANCELLED (admin action). EXPIRED and CANCELLED are
/// terminal; a renewal is a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

/// A company's subscription record. At most one ACTIVE row per HR account
/// (partial unique index).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CompanySubscription {
    /// Unique identifier for the subscription.
    pub id: Uuid,
    /// The subscribing HR account.
    pub hr_profile_id: Uuid,
    /// The purchased plan.
    pub plan_id: Uuid,
    /// Lifecycle state.
    pub status: SubscriptionStatus,
    /// Set on activation.
    pub start_date: Option<DateTime<Utc>>,
    /// Set on activation; the subscription is active while `now <= end_date`.
    pub end_date: Option<DateTime<Utc>>,
    /// Credits consumed against a metered plan. Unused for unlimited plans.
    pub credits_used: i64,
    /// Payment transaction ID or reference.
    pub payment_reference: String,
    /// Reason recorded on cancellation.
    pub cancellation_reason: String,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

/// Records that an HR account unlocked a candidate. Unique per
/// (hr_profile, candidate) — the grant is permanent and idempotent.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// Unique identifier for the record.
    pub id: Uuid,
    /// The unlocking HR account.
    pub hr_profile_id: Uuid,
    /// The unlocked candidate.
    pub candidate_id: Uuid,
    /// Credits charged at unlock time.
    pub credits_used: i64,
    /// When the unlock happened.
    pub unlocked_at: DateTime<Utc>,
}

/// Admin-configured credit pricing. Singleton row (id = 1).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CreditSettings {
    /// Always 1.
    pub id: i32,
    /// Price for one credit.
    pub price_per_credit: BigDecimal,
    /// Credits charged per candidate unlock.
    pub unlock_credits_required: i64,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

/// In-app notification row, written alongside every push dispatch.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserNotification {
    /// Unique identifier for the notification.
    pub id: Uuid,
    /// Recipient HR account.
    pub hr_profile_id: Uuid,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Structured payload for client routing.
    pub data_payload: serde_json::Value,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

// ============ Request DTOs ============

/// Body for POST /api/v1/wallet/recharge.
#[derive(Debug, Clone, Deserialize)]
pub struct RechargeRequest {
    /// Credits to add. Must be positive.
    pub credits: i64,
    /// Optional payment reference recorded on the transaction.
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Query parameters for the candidate directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateQueryParams {
    pub role: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub min_experience: Option<i32>,
    pub max_experience: Option<i32>,
    /// Substring match against the skills column.
    pub skills: Option<String>,
}

/// Body for POST /api/v1/subscriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRequest {
    pub plan_id: Uuid,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Body for POST /api/v1/admin/subscriptions/:id/cancel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ============ Response DTOs ============

/// Candidate as served before unlock: contact details and full name withheld.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedCandidate {
    pub id: Uuid,
    pub masked_name: String,
    pub age: i32,
    pub role: String,
    pub experience_years: i32,
    pub expected_ctc: Option<BigDecimal>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub skills: Vec<String>,
    pub education: Option<String>,
    pub is_unlocked: bool,
}

impl From<&Candidate> for MaskedCandidate {
    fn from(c: &Candidate) -> Self {
        Self {
            id: c.id,
            masked_name: c.masked_name.clone(),
            age: c.age,
            role: c.role.clone(),
            experience_years: c.experience_years,
            expected_ctc: c.expected_ctc.clone(),
            city: c.city.clone(),
            state: c.state.clone(),
            skills: c.skills_list(),
            education: c.education.clone(),
            is_unlocked: false,
        }
    }
}

/// Candidate as served after unlock: everything, unmasked.
#[derive(Debug, Clone, Serialize)]
pub struct FullCandidate {
    pub id: Uuid,
    pub full_name: String,
    pub masked_name: String,
    pub phone: String,
    pub email: String,
    pub age: i32,
    pub role: String,
    pub experience_years: i32,
    pub current_ctc: Option<BigDecimal>,
    pub expected_ctc: Option<BigDecimal>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub skills: Vec<String>,
    pub education: Option<String>,
    pub is_unlocked: bool,
}

impl From<&Candidate> for FullCandidate {
    fn from(c: &Candidate) -> Self {
        Self {
            id: c.id,
            full_name: c.full_name.clone(),
            masked_name: c.masked_name.clone(),
            phone: c.phone.clone(),
            email: c.email.clone(),
            age: c.age,
            role: c.role.clone(),
            experience_years: c.experience_years,
            current_ctc: c.current_ctc.clone(),
            expected_ctc: c.expected_ctc.clone(),
            city: c.city.clone(),
            state: c.state.clone(),
            skills: c.skills_list(),
            education: c.education.clone(),
            is_unlocked: true,
        }
    }
}

/// A directory entry: full data when unlocked for the caller, masked otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CandidateListing {
    Full(FullCandidate),
    Masked(MaskedCandidate),
}

/// An unlocked candidate with the credits spent on it.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedCandidate {
    #[serde(flatten)]
    pub candidate: FullCandidate,
    pub credits_used: i64,
}

/// Response for POST /api/v1/candidates/:id/unlock.
///
/// `credits_used` and `remaining_balance` are absent on the idempotent
/// already-unlocked path, which charges nothing.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockResponse {
    pub success: bool,
    pub message: String,
    pub candidate: FullCandidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<i64>,
    pub already_unlocked: bool,
}

/// Subscription status summary for an HR account.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatusInfo {
    pub has_subscription: bool,
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<String>,
    pub plan_type: Option<PlanType>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub is_unlimited: bool,
    pub credits_used: i64,
    pub credits_limit: Option<i64>,
    pub warning_level: Option<ExpiryWarningLevel>,
}

/// How close an active subscription is to expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryWarningLevel {
    Critical,
    High,
    Medium,
    Low,
}

/// Response for GET /api/v1/wallet.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub success: bool,
    pub wallet: Wallet,
    pub subscription: SubscriptionStatusInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            full_name: "Asha Verma".to_string(),
            masked_name: "A*** V.".to_string(),
            phone: "9876543210".to_string(),
            email: "asha@example.com".to_string(),
            age: 29,
            role: "Backend Engineer".to_string(),
            experience_years: 6,
            current_ctc: None,
            expected_ctc: None,
            city: Some("Pune".to_string()),
            state: Some("Maharashtra".to_string()),
            skills: "rust, postgres , axum,,".to_string(),
            education: Some("B.Tech".to_string()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn skills_list_trims_and_drops_empties() {
        let c = sample_candidate();
        assert_eq!(c.skills_list(), vec!["rust", "postgres", "axum"]);
    }

    #[test]
    fn masked_candidate_withholds_contact_details() {
        let c = sample_candidate();
        let masked = serde_json::to_value(MaskedCandidate::from(&c)).unwrap();
        assert!(masked.get("full_name").is_none());
        assert!(masked.get("phone").is_none());
        assert!(masked.get("email").is_none());
        assert_eq!(masked["masked_name"], "A*** V.");
        assert_eq!(masked["is_unlocked"], false);
    }

    #[test]
    fn full_candidate_exposes_everything() {
        let c = sample_candidate();
        let full = serde_json::to_value(FullCandidate::from(&c)).unwrap();
        assert_eq!(full["full_name"], "Asha Verma");
        assert_eq!(full["phone"], "9876543210");
        assert_eq!(full["is_unlocked"], true);
    }

    #[test]
    fn plan_durations_match_billing_periods() {
        assert_eq!(PlanType::Monthly.duration_days(), 30);
        assert_eq!(PlanType::Quarterly.duration_days(), 90);
        assert_eq!(PlanType::HalfYearly.duration_days(), 180);
        assert_eq!(PlanType::Yearly.duration_days(), 365);
    }
}
