/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use chrono::{Duration, Utc};
use proptest::prelude::*;
use talentgate_api::models::SubscriptionStatus;
use talentgate_api::subscriptions::{
    days_until_expiry, expiry_warning_level, SubscriptionSnapshot,
};
use talentgate_api::unlock::{decide_funding, FundingDecision, FundingSource};

fn arb_status() -> impl Strategy<Value = SubscriptionStatus> {
    prop_oneof![
        Just(SubscriptionStatus::Pending),
        Just(SubscriptionStatus::Active),
        Just(SubscriptionStatus::Expired),
        Just(SubscriptionStatus::Cancelled),
    ]
}

fn arb_snapshot() -> impl Strategy<Value = SubscriptionSnapshot> {
    (
        arb_status(),
        proptest::option::of(-400i64..400),
        proptest::bool::ANY,
        proptest::option::of(0i64..10_000),
        0i64..10_000,
    )
        .prop_map(|(status, end_in_days, is_unlimited, credits_limit, credits_used)| {
            SubscriptionSnapshot {
                status,
                end_date: end_in_days.map(|d| Utc::now() + Duration::days(d)),
                is_unlimited,
                credits_limit,
                credits_used,
            }
        })
}

// Property: the funding decision never panics and is total
proptest! {
    #[test]
    fn decide_funding_never_panics(
        balance in 0i64..1_000_000,
        required in 1i64..10_000,
        sub in proptest::option::of(arb_snapshot())
    ) {
        let _ = decide_funding(balance, sub.as_ref(), required, Utc::now());
    }

    #[test]
    fn insufficient_only_when_no_source_covers_the_charge(
        balance in 0i64..1_000,
        required in 1i64..1_000,
        sub in proptest::option::of(arb_snapshot())
    ) {
        let now = Utc::now();
        if let FundingDecision::Insufficient { required: r, balance: b } =
            decide_funding(balance, sub.as_ref(), required, now)
        {
            prop_assert_eq!(r, required);
            prop_assert_eq!(b, balance);
            prop_assert!(balance < required);
            if let Some(s) = &sub {
                prop_assert!(!s.provides_unlimited_credits(now));
                prop_assert!(!s.can_consume(required, now));
            }
        }
    }

    #[test]
    fn wallet_funding_never_drives_balance_negative(
        balance in 0i64..1_000,
        required in 1i64..1_000,
        sub in proptest::option::of(arb_snapshot())
    ) {
        let now = Utc::now();
        if decide_funding(balance, sub.as_ref(), required, now)
            == FundingDecision::Funded(FundingSource::WalletBalance)
        {
            prop_assert!(balance - required >= 0);
        }
    }

    #[test]
    fn active_unlimited_subscription_always_wins(
        balance in 0i64..1_000_000,
        required in 1i64..10_000,
        days_left in 1i64..365
    ) {
        let now = Utc::now();
        let sub = SubscriptionSnapshot {
            status: SubscriptionStatus::Active,
            end_date: Some(now + Duration::days(days_left)),
            is_unlimited: true,
            credits_limit: None,
            credits_used: 0,
        };
        prop_assert_eq!(
            decide_funding(balance, Some(&sub), required, now),
            FundingDecision::Funded(FundingSource::UnlimitedSubscription)
        );
    }

    #[test]
    fn metered_funding_respects_the_plan_limit(
        balance in 0i64..1_000,
        required in 1i64..1_000,
        sub in arb_snapshot()
    ) {
        let now = Utc::now();
        if decide_funding(balance, Some(&sub), required, now)
            == FundingDecision::Funded(FundingSource::MeteredSubscription)
        {
            let limit = sub.credits_limit.expect("metered funding requires a limit");
            prop_assert!(sub.credits_used + required <= limit);
            prop_assert!(!sub.is_unlimited);
        }
    }

    #[test]
    fn subscription_funding_requires_an_active_subscription(
        balance in 0i64..1_000,
        required in 1i64..1_000,
        sub in arb_snapshot()
    ) {
        let now = Utc::now();
        match decide_funding(balance, Some(&sub), required, now) {
            FundingDecision::Funded(FundingSource::UnlimitedSubscription)
            | FundingDecision::Funded(FundingSource::MeteredSubscription) => {
                prop_assert!(sub.is_currently_active(now));
            }
            _ => {}
        }
    }
}

// Property: expiry helpers are total and well-behaved
proptest! {
    #[test]
    fn days_until_expiry_is_never_negative(offset_days in -1_000i64..1_000) {
        let now = Utc::now();
        let days = days_until_expiry(now + Duration::days(offset_days), now);
        prop_assert!(days >= 0);
    }

    #[test]
    fn warning_level_is_total(days in 0i64..100_000) {
        // Every remaining-day count maps to exactly one level.
        let _ = expiry_warning_level(days);
    }

    #[test]
    fn lazy_expiry_and_active_are_mutually_exclusive(sub in arb_snapshot()) {
        let now = Utc::now();
        prop_assert!(!(sub.is_currently_active(now) && sub.needs_lazy_expiry(now)));
    }
}
