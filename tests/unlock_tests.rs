/// Unit tests for the unlock funding decision.
///
/// The decision is pure: it takes the wallet balance and a subscription
/// snapshot captured under row locks, so every gating combination can be
/// exercised here without a database.
use chrono::{DateTime, Duration, Utc};
use talentgate_api::models::SubscriptionStatus;
use talentgate_api::subscriptions::SubscriptionSnapshot;
use talentgate_api::unlock::{decide_funding, FundingDecision, FundingSource};

fn active_unlimited(days_left: i64) -> (SubscriptionSnapshot, DateTime<Utc>) {
    let now = Utc::now();
    (
        SubscriptionSnapshot {
            status: SubscriptionStatus::Active,
            end_date: Some(now + Duration::days(days_left)),
            is_unlimited: true,
            credits_limit: None,
            credits_used: 0,
        },
        now,
    )
}

fn active_metered(limit: i64, used: i64) -> (SubscriptionSnapshot, DateTime<Utc>) {
    let now = Utc::now();
    (
        SubscriptionSnapshot {
            status: SubscriptionStatus::Active,
            end_date: Some(now + Duration::days(30)),
            is_unlimited: false,
            credits_limit: Some(limit),
            credits_used: used,
        },
        now,
    )
}

#[test]
fn no_subscription_sufficient_balance_uses_wallet() {
    let now = Utc::now();
    assert_eq!(
        decide_funding(50, None, 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
}

#[test]
fn no_subscription_exact_balance_still_funds() {
    let now = Utc::now();
    assert_eq!(
        decide_funding(10, None, 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
}

#[test]
fn no_subscription_insufficient_balance_reports_both_numbers() {
    let now = Utc::now();
    assert_eq!(
        decide_funding(3, None, 10, now),
        FundingDecision::Insufficient {
            required: 10,
            balance: 3
        }
    );
}

#[test]
fn unlimited_subscription_funds_with_zero_balance() {
    let (sub, now) = active_unlimited(30);
    assert_eq!(
        decide_funding(0, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::UnlimitedSubscription)
    );
}

#[test]
fn unlimited_subscription_preferred_over_a_full_wallet() {
    let (sub, now) = active_unlimited(30);
    assert_eq!(
        decide_funding(1_000_000, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::UnlimitedSubscription)
    );
}

#[test]
fn metered_subscription_with_room_preferred_over_wallet() {
    let (sub, now) = active_metered(100, 0);
    assert_eq!(
        decide_funding(500, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::MeteredSubscription)
    );
}

#[test]
fn metered_subscription_funds_exactly_to_its_limit() {
    let (sub, now) = active_metered(100, 90);
    assert_eq!(
        decide_funding(0, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::MeteredSubscription)
    );
}

#[test]
fn exhausted_metered_subscription_falls_back_to_wallet() {
    let (sub, now) = active_metered(100, 95);
    // 5 credits left on the plan but 10 needed; partial funding never happens.
    assert_eq!(
        decide_funding(20, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
}

#[test]
fn exhausted_metered_subscription_and_poor_wallet_is_insufficient() {
    let (sub, now) = active_metered(100, 95);
    assert_eq!(
        decide_funding(4, Some(&sub), 10, now),
        FundingDecision::Insufficient {
            required: 10,
            balance: 4
        }
    );
}

#[test]
fn metered_subscription_without_limit_cannot_fund() {
    let now = Utc::now();
    let sub = SubscriptionSnapshot {
        status: SubscriptionStatus::Active,
        end_date: Some(now + Duration::days(30)),
        is_unlimited: false,
        credits_limit: None,
        credits_used: 0,
    };
    assert_eq!(
        decide_funding(50, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
}

#[test]
fn expired_unlimited_subscription_is_ignored() {
    let (sub, _) = active_unlimited(30);
    let now = Utc::now() + Duration::days(31);
    assert_eq!(
        decide_funding(50, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
    assert_eq!(
        decide_funding(5, Some(&sub), 10, now),
        FundingDecision::Insufficient {
            required: 10,
            balance: 5
        }
    );
}

#[test]
fn pending_subscription_is_ignored() {
    let now = Utc::now();
    let sub = SubscriptionSnapshot {
        status: SubscriptionStatus::Pending,
        end_date: None,
        is_unlimited: true,
        credits_limit: None,
        credits_used: 0,
    };
    assert_eq!(
        decide_funding(50, Some(&sub), 10, now),
        FundingDecision::Funded(FundingSource::WalletBalance)
    );
}

#[test]
fn cancelled_subscription_is_ignored() {
    let now = Utc::now();
    let sub = SubscriptionSnapshot {
        status: SubscriptionStatus::Cancelled,
        end_date: Some(now + Duration::days(30)),
        is_unlimited: true,
        credits_limit: None,
        credits_used: 0,
    };
    assert_eq!(
        decide_funding(0, Some(&sub), 10, now),
        FundingDecision::Insufficient {
            required: 10,
            balance: 0
        }
    );
}

#[test]
fn insufficient_credits_error_message_names_both_numbers() {
    let err = talentgate_api::errors::AppError::InsufficientCredits {
        required: 10,
        balance: 3,
    };
    assert_eq!(
        err.to_string(),
        "Insufficient credits. You need 10 credits but have 3."
    );
}
