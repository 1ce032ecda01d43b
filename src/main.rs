mod candidates;
mod config;
mod db;
mod errors;
mod handlers;
mod jobs;
mod models;
mod notifications;
mod subscriptions;
mod unlock;
mod wallet;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::notifications::{Notifier, PushGatewayClient};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and migrations.
/// - The credit-settings cache.
/// - The optional push gateway client.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server and the subscription maintenance loop.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Ok if the server runs successfully, or an error if initialization fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talentgate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and run migrations
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Credit settings cache (30 second TTL) so unlocks don't hit the
    // singleton row on every request while admin edits still land quickly
    let settings_cache = Cache::builder()
        .time_to_live(Duration::from_secs(30))
        .max_capacity(1)
        .build();
    tracing::info!("Credit settings cache initialized");

    // Initialize the push gateway client when configured
    let push_client = match (&config.push_gateway_url, &config.push_gateway_key) {
        (Some(url), Some(key)) => match PushGatewayClient::new(url.clone(), key.clone()) {
            Ok(client) => {
                tracing::info!("✓ Push gateway client initialized: {}", url);
                Some(client)
            }
            Err(e) => {
                tracing::error!("Failed to initialize push gateway client: {}", e);
                None
            }
        },
        _ => {
            tracing::info!("Push gateway not configured; notifications are in-app only");
            None
        }
    };

    let notifier = Notifier::new(db.pool.clone(), push_client);

    // Build application state
    let app_state = crate::handlers::AppState {
        pool: db.pool.clone(),
        config: Arc::new(config.clone()),
        notifier: notifier.clone(),
        settings_cache,
    };

    // Background sweep for subscription expiry and warnings
    tokio::spawn(jobs::run_subscription_maintenance(
        db.pool.clone(),
        notifier,
    ));

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Wallet endpoints
        .route("/api/v1/wallet", get(handlers::get_wallet))
        .route("/api/v1/wallet/recharge", post(handlers::recharge_wallet))
        .route(
            "/api/v1/wallet/transactions",
            get(handlers::list_transactions),
        )
        // Candidate endpoints
        .route("/api/v1/candidates", get(handlers::list_candidates))
        .route(
            "/api/v1/candidates/unlocked",
            get(handlers::list_unlocked_candidates),
        )
        .route("/api/v1/candidates/:id", get(handlers::get_candidate))
        .route(
            "/api/v1/candidates/:id/unlock",
            post(handlers::unlock_candidate),
        )
        // Subscription endpoints
        .route("/api/v1/subscriptions/plans", get(handlers::list_plans))
        .route("/api/v1/subscriptions", post(handlers::request_subscription))
        .route(
            "/api/v1/subscriptions/current",
            get(handlers::current_subscription),
        )
        .route(
            "/api/v1/subscriptions/status",
            get(handlers::subscription_status),
        )
        // Notification endpoints
        .route("/api/v1/notifications", get(handlers::list_notifications))
        .route(
            "/api/v1/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        // Admin endpoints
        .route(
            "/api/v1/admin/subscriptions/:id/activate",
            post(handlers::activate_subscription),
        )
        .route(
            "/api/v1/admin/subscriptions/:id/cancel",
            post(handlers::cancel_subscription),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
