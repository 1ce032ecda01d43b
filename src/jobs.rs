use crate::notifications::Notifier;
use crate::subscriptions::SubscriptionService;
use sqlx::PgPool;
use std::time::Duration;

/// How often the maintenance sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodic subscription maintenance: expires ACTIVE subscriptions past
/// their end date and sends expiring-soon warnings.
///
/// Lazy expiry on the request path keeps gating correct even if this loop
/// falls behind; the sweep exists so expiry notifications go out for idle
/// accounts too. Errors are logged and the next tick retries.
pub async fn run_subscription_maintenance(pool: PgPool, notifier: Notifier) {
    let service = SubscriptionService::new(pool);
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match service.expire_old(&notifier).await {
            Ok(expired) if expired > 0 => {
                tracing::info!("Expired {} overdue subscriptions", expired);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Subscription expiry sweep failed: {}", e);
            }
        }

        match service.send_expiry_warnings(&notifier).await {
            Ok(sent) if sent > 0 => {
                tracing::info!("Sent {} subscription expiry warnings", sent);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Expiry warning sweep failed: {}", e);
            }
        }
    }
}
