//! `club` and `club_membership`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::runs::RunRow;
use crate::{ReadModel, Result};

const CLUB_COLUMNS: &str = "id, last_applied_event_id, name, description, invite_token, logo_url, \
     welcome_text, short_description, created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str =
    "id, last_applied_event_id, club_id, user_id, user_name, role, joined_at, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ClubRow {
    pub id: Uuid,
    pub last_applied_event_id: String,
    pub name: String,
    pub description: Option<String>,
    pub invite_token: String,
    pub logo_url: Option<String>,
    pub welcome_text: Option<Value>,
    pub short_description: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MembershipRow {
    pub id: Uuid,
    pub last_applied_event_id: String,
    pub club_id: Uuid,
    pub user_id: String,
    pub user_name: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClub {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub invite_token: String,
    pub logo_url: Option<String>,
    pub welcome_text: Option<Value>,
    pub short_description: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ClubPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub invite_token: Option<String>,
    pub logo_url: Option<String>,
    pub welcome_text: Option<Value>,
    pub short_description: Option<Value>,
}

impl ClubPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.invite_token.is_none()
            && self.logo_url.is_none()
            && self.welcome_text.is_none()
            && self.short_description.is_none()
    }
}

/// `user_name: None` falls back to the user projection's name, if the user
/// has been projected yet.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub id: Uuid,
    pub club_id: Uuid,
    pub user_id: String,
    pub user_name: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl ReadModel {
    pub async fn upsert_club(&self, club: &NewClub, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO club (
                id, last_applied_event_id, name, description, invite_token,
                logo_url, welcome_text, short_description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                invite_token = EXCLUDED.invite_token,
                logo_url = EXCLUDED.logo_url,
                welcome_text = EXCLUDED.welcome_text,
                short_description = EXCLUDED.short_description,
                updated_at = now()
            WHERE club.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(club.id)
        .bind(event_id)
        .bind(&club.name)
        .bind(&club.description)
        .bind(&club.invite_token)
        .bind(&club.logo_url)
        .bind(&club.welcome_text)
        .bind(&club.short_description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn patch_club(&self, id: Uuid, patch: &ClubPatch, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE club SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                invite_token = COALESCE($5, invite_token),
                logo_url = COALESCE($6, logo_url),
                welcome_text = COALESCE($7, welcome_text),
                short_description = COALESCE($8, short_description),
                last_applied_event_id = $1,
                updated_at = now()
            WHERE id = $2 AND last_applied_event_id IS DISTINCT FROM $1
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&patch.invite_token)
        .bind(&patch.logo_url)
        .bind(&patch.welcome_text)
        .bind(&patch.short_description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn upsert_membership(&self, membership: &NewMembership, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO club_membership (
                id, last_applied_event_id, club_id, user_id, user_name, role, joined_at
            )
            VALUES (
                $1, $2, $3, $4,
                COALESCE($5, (SELECT name FROM app_user WHERE id = $4)),
                $6, $7
            )
            ON CONFLICT (id) DO UPDATE SET
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                club_id = EXCLUDED.club_id,
                user_id = EXCLUDED.user_id,
                user_name = EXCLUDED.user_name,
                role = EXCLUDED.role,
                joined_at = EXCLUDED.joined_at,
                updated_at = now()
            WHERE club_membership.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(membership.id)
        .bind(event_id)
        .bind(membership.club_id)
        .bind(&membership.user_id)
        .bind(&membership.user_name)
        .bind(&membership.role)
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_membership(&self, club_id: Uuid, user_id: &str, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM club_membership
            WHERE club_id = $1 AND user_id = $2
              AND last_applied_event_id IS DISTINCT FROM $3
            "#,
        )
        .bind(club_id)
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_club(&self, id: Uuid) -> Result<Option<ClubRow>> {
        let row = sqlx::query_as::<_, ClubRow>(&format!("SELECT {CLUB_COLUMNS} FROM club WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn club_by_invite_token(&self, invite_token: &str) -> Result<Option<ClubRow>> {
        let row = sqlx::query_as::<_, ClubRow>(&format!(
            "SELECT {CLUB_COLUMNS} FROM club WHERE invite_token = $1 LIMIT 1"
        ))
        .bind(invite_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn clubs_for_user(&self, user_id: &str) -> Result<Vec<ClubRow>> {
        let rows = sqlx::query_as::<_, ClubRow>(
            r#"
            SELECT DISTINCT c.id, c.last_applied_event_id, c.name, c.description, c.invite_token,
                   c.logo_url, c.welcome_text, c.short_description, c.created_at, c.updated_at
            FROM club c
            INNER JOIN club_membership cm ON cm.club_id = c.id
            WHERE cm.user_id = $1
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn club_members(&self, club_id: Uuid) -> Result<Vec<MembershipRow>> {
        let rows = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM club_membership WHERE club_id = $1 ORDER BY joined_at ASC"
        ))
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Latest non-deleted run per member and run date, most recently updated
    /// first.
    pub async fn club_runs(&self, club_id: Uuid, status: Option<&str>, limit: i64) -> Result<Vec<RunRow>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (p.user_id, p.run_date)
                       p.id, p.last_applied_event_id, p.instance_id, p.user_id, p.runner_name,
                       p.run_date, p.actual_run_date, p.distance_km, p.time_minutes, p.notes,
                       p.status, p.recorded_at, p.change_log, p.created_at, p.updated_at
                FROM club_membership cm
                INNER JOIN performance p ON p.user_id = cm.user_id
                WHERE cm.club_id = $1
                  AND p.status <> 'deleted'
                  AND ($2::text IS NULL OR p.status = $2)
                ORDER BY p.user_id, p.run_date DESC, p.updated_at DESC
            ) latest
            ORDER BY updated_at DESC, run_date DESC
            LIMIT $3
            "#,
        )
        .bind(club_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
