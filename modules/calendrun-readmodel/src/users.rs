use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{ReadModel, Result};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReadModel {
    /// Create or merge a user. Absent fields keep whatever is already stored.
    pub async fn upsert_user(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        event_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO app_user (id, last_applied_event_id, name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, app_user.name),
                email = COALESCE(EXCLUDED.email, app_user.email),
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                updated_at = now()
            WHERE app_user.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(id)
        .bind(event_id)
        .bind(name)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn patch_user(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        event_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE app_user SET
                name = COALESCE($3, name),
                email = COALESCE($4, email),
                last_applied_event_id = $1,
                updated_at = now()
            WHERE id = $2 AND last_applied_event_id IS DISTINCT FROM $1
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, created_at, updated_at FROM app_user WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Users by id, or every user when `ids` is empty. Sorted by name.
    pub async fn list_users(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        let rows = if ids.is_empty() {
            sqlx::query_as::<_, UserRow>(
                "SELECT id, name, email, created_at, updated_at FROM app_user ORDER BY name ASC NULLS LAST",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, name, email, created_at, updated_at FROM app_user
                WHERE id = ANY($1)
                ORDER BY name ASC NULLS LAST
                "#,
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows)
    }
}
