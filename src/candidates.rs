use crate::errors::AppError;
use crate::models::{
    Candidate, CandidateListing, CandidateQueryParams, FullCandidate, MaskedCandidate,
    UnlockedCandidate,
};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

/// Read side of the candidate marketplace.
///
/// Every listing is masked unless the calling account has an unlock record
/// for that candidate. Unlock records never expire, so a candidate stays
/// visible in full even after the funding subscription lapses.
pub struct CandidateDirectory {
    pool: PgPool,
}

impl CandidateDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Filtered directory listing for the calling account, newest first.
    pub async fn list(
        &self,
        hr_profile_id: Uuid,
        params: &CandidateQueryParams,
    ) -> Result<Vec<CandidateListing>, AppError> {
        let skills_pattern = params.skills.as_ref().map(|s| format!("%{}%", s.trim()));

        let candidates = sqlx::query_as::<_, Candidate>(
            "SELECT * FROM candidates
             WHERE is_active = true
               AND ($1::text IS NULL OR role = $1)
               AND ($2::text IS NULL OR city = $2)
               AND ($3::text IS NULL OR state = $3)
               AND ($4::int IS NULL OR experience_years >= $4)
               AND ($5::int IS NULL OR experience_years <= $5)
               AND ($6::text IS NULL OR skills ILIKE $6)
             ORDER BY created_at DESC",
        )
        .bind(&params.role)
        .bind(&params.city)
        .bind(&params.state)
        .bind(params.min_experience)
        .bind(params.max_experience)
        .bind(&skills_pattern)
        .fetch_all(&self.pool)
        .await?;

        let unlocked = self.unlocked_ids(hr_profile_id).await?;

        Ok(candidates
            .iter()
            .map(|c| {
                if unlocked.contains(&c.id) {
                    CandidateListing::Full(FullCandidate::from(c))
                } else {
                    CandidateListing::Masked(MaskedCandidate::from(c))
                }
            })
            .collect())
    }

    /// Single candidate, masked or full depending on the caller's unlocks.
    pub async fn get(
        &self,
        hr_profile_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<CandidateListing, AppError> {
        let candidate = sqlx::query_as::<_, Candidate>(
            "SELECT * FROM candidates WHERE id = $1 AND is_active = true",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;

        let unlocked: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM unlock_history
                 WHERE hr_profile_id = $1 AND candidate_id = $2
             )",
        )
        .bind(hr_profile_id)
        .bind(candidate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if unlocked.0 {
            CandidateListing::Full(FullCandidate::from(&candidate))
        } else {
            CandidateListing::Masked(MaskedCandidate::from(&candidate))
        })
    }

    /// All candidates the account has unlocked, most recent unlock first.
    /// Inactive candidates remain visible here since the unlock was paid for.
    pub async fn unlocked(&self, hr_profile_id: Uuid) -> Result<Vec<UnlockedCandidate>, AppError> {
        let rows = sqlx::query_as::<_, UnlockJoinRow>(
            "SELECT c.*, uh.credits_used AS unlock_credits_used
             FROM unlock_history uh
             JOIN candidates c ON c.id = uh.candidate_id
             WHERE uh.hr_profile_id = $1
             ORDER BY uh.unlocked_at DESC",
        )
        .bind(hr_profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UnlockedCandidate {
                candidate: FullCandidate::from(&row.candidate),
                credits_used: row.unlock_credits_used,
            })
            .collect())
    }

    async fn unlocked_ids(&self, hr_profile_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT candidate_id FROM unlock_history WHERE hr_profile_id = $1",
        )
        .bind(hr_profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct UnlockJoinRow {
    #[sqlx(flatten)]
    candidate: Candidate,
    unlock_credits_used: i64,
}
