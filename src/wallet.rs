use crate::errors::AppError;
use crate::models::{CreditSettings, Wallet, WalletTransaction};
use moka::future::Cache;
use sqlx::PgPool;
use uuid::Uuid;

/// Cache key for the credit-settings singleton (there is only one row).
const SETTINGS_CACHE_KEY: u8 = 0;

/// Credit ledger service: balances, recharges and the append-only
/// transaction log. Deductions happen only inside the unlock gate's
/// transaction so they stay atomic with the unlock record.
pub struct WalletService {
    pool: PgPool,
    settings_cache: Cache<u8, CreditSettings>,
}

impl WalletService {
    pub fn new(pool: PgPool, settings_cache: Cache<u8, CreditSettings>) -> Self {
        Self {
            pool,
            settings_cache,
        }
    }

    /// Fetches the account's wallet, provisioning an empty one on first read.
    pub async fn get_or_create(&self, hr_profile_id: Uuid) -> Result<Wallet, AppError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "INSERT INTO wallets (hr_profile_id)
             VALUES ($1)
             ON CONFLICT (hr_profile_id) DO UPDATE SET updated_at = wallets.updated_at
             RETURNING *",
        )
        .bind(hr_profile_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Adds `credits` to the wallet and appends the RECHARGE transaction,
    /// in one database transaction. No upper bound is enforced.
    pub async fn recharge(
        &self,
        hr_profile_id: Uuid,
        credits: i64,
        payment_reference: Option<String>,
    ) -> Result<Wallet, AppError> {
        if credits <= 0 {
            return Err(AppError::BadRequest(
                "Credits must be a positive number".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            "INSERT INTO wallets (hr_profile_id, balance)
             VALUES ($1, $2)
             ON CONFLICT (hr_profile_id)
             DO UPDATE SET balance = wallets.balance + $2, updated_at = now()
             RETURNING *",
        )
        .bind(hr_profile_id)
        .bind(credits)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO wallet_transactions
                 (wallet_id, transaction_type, credits_added, reference_id, description)
             VALUES ($1, 'RECHARGE', $2, $3, $4)",
        )
        .bind(wallet.id)
        .bind(credits)
        .bind(payment_reference.unwrap_or_default())
        .bind(format!("Wallet recharged with {} credits", credits))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Wallet {} recharged with {} credits (balance: {})",
            wallet.id,
            credits,
            wallet.balance
        );
        Ok(wallet)
    }

    /// Transaction history for the account, newest first. An account
    /// without a wallet has no history.
    pub async fn transactions(
        &self,
        hr_profile_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(
            "SELECT wt.* FROM wallet_transactions wt
             JOIN wallets w ON w.id = wt.wallet_id
             WHERE w.hr_profile_id = $1
             ORDER BY wt.created_at DESC",
        )
        .bind(hr_profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Current credit pricing. The singleton row is created on first read
    /// and served through a short-lived cache, so admin edits take effect
    /// within the cache TTL without a query per unlock.
    pub async fn credit_settings(&self) -> Result<CreditSettings, AppError> {
        let pool = self.pool.clone();
        self.settings_cache
            .try_get_with(SETTINGS_CACHE_KEY, async move {
                let settings = sqlx::query_as::<_, CreditSettings>(
                    "INSERT INTO credit_settings (id)
                     VALUES (1)
                     ON CONFLICT (id) DO UPDATE SET updated_at = credit_settings.updated_at
                     RETURNING *",
                )
                .fetch_one(&pool)
                .await?;
                Ok::<_, AppError>(settings)
            })
            .await
            .map_err(|e: std::sync::Arc<AppError>| (*e).clone())
    }
}
