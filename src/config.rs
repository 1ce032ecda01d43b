use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub admin_api_key: String,
    pub push_gateway_url: Option<String>, // Push dispatch is optional; in-app rows are always written
    pub push_gateway_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            admin_api_key: std::env::var("ADMIN_API_KEY")
                .map_err(|_| anyhow::anyhow!("ADMIN_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("ADMIN_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("PUSH_GATEWAY_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
            push_gateway_key: std::env::var("PUSH_GATEWAY_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        if let Some(ref gateway) = config.push_gateway_url {
            tracing::info!("Push gateway configured: {}", gateway);
        } else {
            tracing::info!("Push gateway not configured; notifications are in-app only");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
