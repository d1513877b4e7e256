use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{ReadModel, Result};

const TEMPLATE_COLUMNS: &str = "id, last_applied_event_id, name, description, start_date, end_date, days, \
     required_distances_km, full_distance_total_km, half_distance_total_km, theme_key, \
     created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub last_applied_event_id: String,
    pub name: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub required_distances_km: Vec<f64>,
    pub full_distance_total_km: f64,
    pub half_distance_total_km: f64,
    pub theme_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub required_distances_km: Vec<f64>,
    pub full_distance_total_km: f64,
    pub half_distance_total_km: f64,
    pub theme_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<i32>,
    pub required_distances_km: Option<Vec<f64>>,
    pub full_distance_total_km: Option<f64>,
    pub half_distance_total_km: Option<f64>,
    pub theme_key: Option<String>,
}

impl TemplatePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.days.is_none()
            && self.required_distances_km.is_none()
            && self.full_distance_total_km.is_none()
            && self.half_distance_total_km.is_none()
            && self.theme_key.is_none()
    }
}

impl ReadModel {
    pub async fn upsert_template(&self, template: &NewTemplate, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_template (
                id, last_applied_event_id, name, description, start_date, end_date,
                days, required_distances_km, full_distance_total_km,
                half_distance_total_km, theme_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                days = EXCLUDED.days,
                required_distances_km = EXCLUDED.required_distances_km,
                full_distance_total_km = EXCLUDED.full_distance_total_km,
                half_distance_total_km = EXCLUDED.half_distance_total_km,
                theme_key = EXCLUDED.theme_key,
                updated_at = now()
            WHERE challenge_template.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(template.id)
        .bind(event_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.start_date)
        .bind(template.end_date)
        .bind(template.days)
        .bind(&template.required_distances_km)
        .bind(template.full_distance_total_km)
        .bind(template.half_distance_total_km)
        .bind(&template.theme_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn patch_template(&self, id: Uuid, patch: &TemplatePatch, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE challenge_template SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                start_date = COALESCE($5, start_date),
                end_date = COALESCE($6, end_date),
                days = COALESCE($7, days),
                required_distances_km = COALESCE($8, required_distances_km),
                full_distance_total_km = COALESCE($9, full_distance_total_km),
                half_distance_total_km = COALESCE($10, half_distance_total_km),
                theme_key = COALESCE($11, theme_key),
                last_applied_event_id = $1,
                updated_at = now()
            WHERE id = $2 AND last_applied_event_id IS DISTINCT FROM $1
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.start_date)
        .bind(patch.end_date)
        .bind(patch.days)
        .bind(&patch.required_distances_km)
        .bind(patch.full_distance_total_km)
        .bind(patch.half_distance_total_km)
        .bind(&patch.theme_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_template(&self, id: Uuid, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM challenge_template WHERE id = $1 AND last_applied_event_id IS DISTINCT FROM $2",
        )
        .bind(id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_template(&self, id: Uuid) -> Result<Option<TemplateRow>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM challenge_template WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateRow>> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM challenge_template ORDER BY start_date DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
