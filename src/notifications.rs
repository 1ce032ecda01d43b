use crate::errors::AppError;
use chrono::{DateTime, Utc};
use failsafe::{backoff, failure_policy, StateMachine};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

type PushBreaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates the circuit breaker guarding the push gateway.
///
/// Five consecutive failures open the circuit; recovery is probed with
/// exponential backoff between 10s and 60s.
fn create_push_circuit_breaker() -> PushBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    failsafe::Config::new()
        .failure_policy(failure_policy)
        .build()
}

/// Client for the external push-notification gateway.
///
/// The gateway owns device tokens and delivery; this service only hands it
/// a recipient account id, a title/body and a data payload.
#[derive(Clone)]
pub struct PushGatewayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: Arc<PushBreaker>,
}

impl PushGatewayClient {
    /// Creates a new `PushGatewayClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the push gateway.
    /// * `api_key` - The API key for authentication.
    pub fn new(base_url: String, api_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create push client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            breaker: Arc::new(create_push_circuit_breaker()),
        })
    }

    /// Sends one push message through the gateway.
    ///
    /// # Arguments
    ///
    /// * `hr_profile_id` - Recipient account.
    /// * `title` - Notification title.
    /// * `body` - Notification body.
    /// * `data` - Structured payload for client routing.
    ///
    /// # Returns
    ///
    /// * `Result<(), AppError>` - Ok on 2xx, error otherwise (including
    ///   fast-fail while the circuit is open).
    pub async fn send(
        &self,
        hr_profile_id: Uuid,
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<(), AppError> {
        use failsafe::futures::CircuitBreaker;

        let url = format!("{}/v1/push", self.base_url);
        let payload = json!({
            "account_id": hr_profile_id,
            "title": title,
            "body": body,
            "data": data,
        });

        let request = async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    AppError::ExternalApiError(format!("Push gateway request failed: {}", e))
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AppError::ExternalApiError(format!(
                    "Push gateway returned {}: {}",
                    status, error_text
                )));
            }

            Ok(())
        };

        self.breaker.call(request).await.map_err(|e| match e {
            failsafe::Error::Inner(inner) => inner,
            failsafe::Error::Rejected => {
                AppError::ExternalApiError("Push gateway circuit open, send rejected".to_string())
            }
        })
    }
}

/// Fire-and-forget notification dispatcher.
///
/// Every notification is persisted as an in-app `user_notifications` row and,
/// when a gateway is configured, forwarded as a push. Dispatch runs on a
/// spawned task; failures are logged and swallowed and can never fail or roll
/// back the operation that triggered them.
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    push: Option<PushGatewayClient>,
}

impl Notifier {
    pub fn new(pool: PgPool, push: Option<PushGatewayClient>) -> Self {
        Self { pool, push }
    }

    /// Queues a notification without waiting for delivery.
    pub fn dispatch(&self, hr_profile_id: Uuid, title: String, body: String, data: Value) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(hr_profile_id, &title, &body, &data).await {
                tracing::warn!(
                    "Notification '{}' for {} failed (dropped): {}",
                    title,
                    hr_profile_id,
                    e
                );
            }
        });
    }

    async fn deliver(
        &self,
        hr_profile_id: Uuid,
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO user_notifications (hr_profile_id, title, body, data_payload)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(hr_profile_id)
        .bind(title)
        .bind(body)
        .bind(data)
        .execute(&self.pool)
        .await?;

        if let Some(push) = &self.push {
            push.send(hr_profile_id, title, body, data).await?;
        }

        Ok(())
    }

    // ---- Notification templates ----

    pub fn profile_unlocked(
        &self,
        hr_profile_id: Uuid,
        candidate_id: Uuid,
        masked_name: &str,
        credits_used: i64,
    ) {
        self.dispatch(
            hr_profile_id,
            "Profile Unlocked".to_string(),
            format!(
                "You unlocked {} for {} credits. Their full profile is now available.",
                masked_name, credits_used
            ),
            json!({
                "type": "unlock",
                "candidate_id": candidate_id,
                "credits_used": credits_used,
            }),
        );
    }

    pub fn wallet_recharged(&self, hr_profile_id: Uuid, credits_added: i64, new_balance: i64) {
        self.dispatch(
            hr_profile_id,
            "Credits Added".to_string(),
            format!(
                "{} credits were added to your wallet. Current balance: {}.",
                credits_added, new_balance
            ),
            json!({
                "type": "wallet",
                "action": "recharge",
                "credits_added": credits_added,
                "current_balance": new_balance,
            }),
        );
    }

    pub fn subscription_activated(
        &self,
        hr_profile_id: Uuid,
        subscription_id: Uuid,
        plan_name: &str,
        end_date: DateTime<Utc>,
    ) {
        self.dispatch(
            hr_profile_id,
            "Subscription Activated".to_string(),
            format!(
                "Your {} subscription has been activated. Valid till {}.",
                plan_name,
                end_date.format("%d %b %Y")
            ),
            json!({
                "type": "subscription",
                "action": "activated",
                "subscription_id": subscription_id.to_string(),
            }),
        );
    }

    pub fn subscription_cancelled(
        &self,
        hr_profile_id: Uuid,
        subscription_id: Uuid,
        plan_name: &str,
        reason: &str,
    ) {
        self.dispatch(
            hr_profile_id,
            "Subscription Cancelled".to_string(),
            format!(
                "Your {} subscription has been cancelled. {}",
                plan_name, reason
            ),
            json!({
                "type": "subscription",
                "action": "cancelled",
                "subscription_id": subscription_id.to_string(),
            }),
        );
    }

    pub fn subscription_expired(&self, hr_profile_id: Uuid, subscription_id: Uuid, plan_name: &str) {
        self.dispatch(
            hr_profile_id,
            "Subscription Expired".to_string(),
            format!(
                "Your {} subscription has expired. Please renew to continue using unlimited credits.",
                plan_name
            ),
            json!({
                "type": "subscription",
                "action": "expired",
                "subscription_id": subscription_id.to_string(),
            }),
        );
    }

    pub fn subscription_expiring(
        &self,
        hr_profile_id: Uuid,
        subscription_id: Uuid,
        plan_name: &str,
        days_remaining: i64,
        end_date: DateTime<Utc>,
    ) {
        let day_word = if days_remaining == 1 { "day" } else { "days" };
        self.dispatch(
            hr_profile_id,
            "Subscription Expiring Soon".to_string(),
            format!(
                "Your {} subscription will expire in {} {} on {}. Please renew to continue.",
                plan_name,
                days_remaining,
                day_word,
                end_date.format("%d %b %Y")
            ),
            json!({
                "type": "subscription",
                "action": "expiring",
                "subscription_id": subscription_id.to_string(),
                "days_remaining": days_remaining,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::{CircuitBreaker, Error};

    #[test]
    fn test_circuit_breaker_opens_after_failures() {
        let cb = create_push_circuit_breaker();

        // Simulate 5 consecutive failures
        for _ in 0..5 {
            let result: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("simulated error"));
            assert!(result.is_err());
        }

        // Next call should be rejected (circuit is open)
        let result: Result<(), Error<&str>> = cb.call(|| Ok::<(), &str>(()));

        // Should be circuit breaker rejection
        match result {
            Err(Error::Rejected) => {
                // Circuit is open, expected behavior
            }
            _ => panic!("Expected circuit to be open and reject requests"),
        }
    }

    #[test]
    fn test_circuit_breaker_allows_success() {
        let cb = create_push_circuit_breaker();

        let result: Result<i32, Error<&str>> = cb.call(|| Ok::<i32, &str>(42));

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_push_client_creation() {
        let client =
            PushGatewayClient::new("https://example.com".to_string(), "key".to_string());
        assert!(client.is_ok());
    }
}
