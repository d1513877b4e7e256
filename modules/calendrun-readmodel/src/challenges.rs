//! `challenge_instance`: a user's participation in a challenge template.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{ReadModel, Result};

const INSTANCE_COLUMNS: &str = "id, last_applied_event_id, template_id, user_id, variant, theme_key, \
     status, joined_at, total_completed_km, succeeded, completed_at, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ChallengeInstanceRow {
    pub id: Uuid,
    pub last_applied_event_id: String,
    pub template_id: Uuid,
    pub user_id: String,
    pub variant: String,
    pub theme_key: String,
    pub status: String,
    pub joined_at: DateTime<Utc>,
    pub total_completed_km: Option<f64>,
    pub succeeded: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub id: Uuid,
    pub template_id: Uuid,
    pub user_id: String,
    pub variant: String,
    pub theme_key: String,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ChallengePatch {
    pub template_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub variant: Option<String>,
    pub theme_key: Option<String>,
    pub status: Option<String>,
    pub total_completed_km: Option<f64>,
    pub succeeded: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChallengePatch {
    pub fn is_empty(&self) -> bool {
        self.template_id.is_none()
            && self.user_id.is_none()
            && self.variant.is_none()
            && self.theme_key.is_none()
            && self.status.is_none()
            && self.total_completed_km.is_none()
            && self.succeeded.is_none()
            && self.completed_at.is_none()
    }
}

impl ReadModel {
    pub async fn upsert_challenge(&self, challenge: &NewChallenge, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_instance (
                id, last_applied_event_id, template_id, user_id, variant,
                theme_key, status, joined_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                template_id = EXCLUDED.template_id,
                user_id = EXCLUDED.user_id,
                variant = EXCLUDED.variant,
                theme_key = EXCLUDED.theme_key,
                status = EXCLUDED.status,
                joined_at = EXCLUDED.joined_at,
                updated_at = now()
            WHERE challenge_instance.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(challenge.id)
        .bind(event_id)
        .bind(challenge.template_id)
        .bind(&challenge.user_id)
        .bind(&challenge.variant)
        .bind(&challenge.theme_key)
        .bind(&challenge.status)
        .bind(challenge.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn patch_challenge(&self, id: Uuid, patch: &ChallengePatch, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE challenge_instance SET
                template_id = COALESCE($3, template_id),
                user_id = COALESCE($4, user_id),
                variant = COALESCE($5, variant),
                theme_key = COALESCE($6, theme_key),
                status = COALESCE($7, status),
                total_completed_km = COALESCE($8, total_completed_km),
                succeeded = COALESCE($9, succeeded),
                completed_at = COALESCE($10, completed_at),
                last_applied_event_id = $1,
                updated_at = now()
            WHERE id = $2 AND last_applied_event_id IS DISTINCT FROM $1
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(patch.template_id)
        .bind(&patch.user_id)
        .bind(&patch.variant)
        .bind(&patch.theme_key)
        .bind(&patch.status)
        .bind(patch.total_completed_km)
        .bind(patch.succeeded)
        .bind(patch.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Close out an instance. Only matches the instance owned by `user_id`.
    pub async fn complete_challenge(
        &self,
        id: Uuid,
        user_id: &str,
        total_completed_km: f64,
        succeeded: bool,
        completed_at: DateTime<Utc>,
        event_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE challenge_instance SET
                status = 'completed',
                total_completed_km = $3,
                succeeded = $4,
                completed_at = $5,
                last_applied_event_id = $6,
                updated_at = now()
            WHERE id = $1 AND user_id = $2
              AND last_applied_event_id IS DISTINCT FROM $6
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(total_completed_km)
        .bind(succeeded)
        .bind(completed_at)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_challenge(&self, id: Uuid) -> Result<Option<ChallengeInstanceRow>> {
        let row = sqlx::query_as::<_, ChallengeInstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM challenge_instance WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_challenges(
        &self,
        user_id: Option<&str>,
        template_id: Option<Uuid>,
    ) -> Result<Vec<ChallengeInstanceRow>> {
        let rows = sqlx::query_as::<_, ChallengeInstanceRow>(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM challenge_instance
            WHERE ($1::text IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR template_id = $2)
            ORDER BY joined_at DESC
            "#
        ))
        .bind(user_id)
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
