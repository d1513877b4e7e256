//! `performance` (one row per run) and its `performance_log` audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{ReadModel, Result};

const RUN_COLUMNS: &str = "id, last_applied_event_id, instance_id, user_id, runner_name, run_date, \
     actual_run_date, distance_km, time_minutes, notes, status, recorded_at, change_log, \
     created_at, updated_at";

const LOG_COLUMNS: &str = "id, event_id, event_type, performance_id, instance_id, user_id, runner_name, \
     run_date, actual_run_date, distance_km, time_minutes, notes, status, recorded_at, \
     change_log, event_payload, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub last_applied_event_id: String,
    pub instance_id: Uuid,
    pub user_id: String,
    pub runner_name: Option<String>,
    pub run_date: NaiveDate,
    pub actual_run_date: Option<NaiveDate>,
    pub distance_km: f64,
    pub time_minutes: Option<i32>,
    pub notes: Option<String>,
    pub status: String,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of a run. `actual_run_date: None` means "today" for a new
/// row and "leave as is" for an existing one.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
    pub runner_name: Option<String>,
    pub run_date: NaiveDate,
    pub actual_run_date: Option<NaiveDate>,
    pub distance_km: f64,
    pub time_minutes: Option<i32>,
    pub notes: Option<String>,
    pub status: String,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
}

/// Partial update. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub runner_name: Option<String>,
    pub run_date: Option<NaiveDate>,
    pub actual_run_date: Option<NaiveDate>,
    pub distance_km: Option<f64>,
    pub time_minutes: Option<i32>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
}

impl RunPatch {
    pub fn is_empty(&self) -> bool {
        self.runner_name.is_none()
            && self.run_date.is_none()
            && self.actual_run_date.is_none()
            && self.distance_km.is_none()
            && self.time_minutes.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.recorded_at.is_none()
            && self.change_log.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub instance_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub run_date: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PerformanceLogRow {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    pub performance_id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
    pub runner_name: Option<String>,
    pub run_date: Option<NaiveDate>,
    pub actual_run_date: Option<NaiveDate>,
    pub distance_km: Option<f64>,
    pub time_minutes: Option<i32>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
    pub event_payload: Value,
    pub created_at: DateTime<Utc>,
}

/// One audit row. Run attributes come from a snapshot of the `performance`
/// row and are all null when there was nothing to snapshot.
#[derive(Debug, Clone)]
pub struct PerformanceLogEntry {
    pub event_id: String,
    pub event_type: String,
    pub performance_id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
    pub snapshot: Option<RunRow>,
    pub event_payload: Value,
}

#[derive(Debug, Clone)]
pub struct PerformanceLogFilter {
    pub user_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ReadModel {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn upsert_run(&self, run: &NewRun, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO performance (
                id, last_applied_event_id, instance_id, user_id, runner_name,
                run_date, actual_run_date, distance_km, time_minutes, notes,
                status, recorded_at, change_log
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, CURRENT_DATE), $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                last_applied_event_id = EXCLUDED.last_applied_event_id,
                instance_id = EXCLUDED.instance_id,
                user_id = EXCLUDED.user_id,
                runner_name = EXCLUDED.runner_name,
                run_date = EXCLUDED.run_date,
                actual_run_date = COALESCE($7, performance.actual_run_date, EXCLUDED.actual_run_date),
                distance_km = EXCLUDED.distance_km,
                time_minutes = EXCLUDED.time_minutes,
                notes = EXCLUDED.notes,
                status = EXCLUDED.status,
                recorded_at = EXCLUDED.recorded_at,
                change_log = EXCLUDED.change_log,
                updated_at = now()
            WHERE performance.last_applied_event_id IS DISTINCT FROM EXCLUDED.last_applied_event_id
            "#,
        )
        .bind(run.id)
        .bind(event_id)
        .bind(run.instance_id)
        .bind(&run.user_id)
        .bind(&run.runner_name)
        .bind(run.run_date)
        .bind(run.actual_run_date)
        .bind(run.distance_km)
        .bind(run.time_minutes)
        .bind(&run.notes)
        .bind(&run.status)
        .bind(run.recorded_at)
        .bind(&run.change_log)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn patch_run(&self, id: Uuid, patch: &RunPatch, event_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE performance SET
                runner_name = COALESCE($3, runner_name),
                run_date = COALESCE($4, run_date),
                actual_run_date = COALESCE($5, actual_run_date),
                distance_km = COALESCE($6, distance_km),
                time_minutes = COALESCE($7, time_minutes),
                notes = COALESCE($8, notes),
                status = COALESCE($9, status),
                recorded_at = COALESCE($10, recorded_at),
                change_log = COALESCE($11, change_log),
                last_applied_event_id = $1,
                updated_at = now()
            WHERE id = $2 AND last_applied_event_id IS DISTINCT FROM $1
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(&patch.runner_name)
        .bind(patch.run_date)
        .bind(patch.actual_run_date)
        .bind(patch.distance_km)
        .bind(patch.time_minutes)
        .bind(&patch.notes)
        .bind(&patch.status)
        .bind(patch.recorded_at)
        .bind(&patch.change_log)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_run(
        &self,
        id: Uuid,
        instance_id: Uuid,
        user_id: &str,
        event_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM performance
            WHERE id = $1 AND instance_id = $2 AND user_id = $3
              AND last_applied_event_id IS DISTINCT FROM $4
            "#,
        )
        .bind(id)
        .bind(instance_id)
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Record an audit row. Keyed by event id, so a redelivered event adds nothing.
    pub async fn append_performance_log(&self, entry: &PerformanceLogEntry) -> Result<u64> {
        let snap = entry.snapshot.as_ref();
        let result = sqlx::query(
            r#"
            INSERT INTO performance_log (
                event_id, event_type, performance_id, instance_id, user_id,
                runner_name, run_date, actual_run_date, distance_km, time_minutes,
                notes, status, recorded_at, change_log, event_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&entry.event_id)
        .bind(&entry.event_type)
        .bind(entry.performance_id)
        .bind(entry.instance_id)
        .bind(&entry.user_id)
        .bind(snap.and_then(|r| r.runner_name.clone()))
        .bind(snap.map(|r| r.run_date))
        .bind(snap.and_then(|r| r.actual_run_date))
        .bind(snap.map(|r| r.distance_km))
        .bind(snap.and_then(|r| r.time_minutes))
        .bind(snap.and_then(|r| r.notes.clone()))
        .bind(snap.map(|r| r.status.clone()))
        .bind(snap.and_then(|r| r.recorded_at))
        .bind(snap.and_then(|r| r.change_log.clone()))
        .bind(&entry.event_payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_run(&self, id: Uuid) -> Result<Option<RunRow>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM performance WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Latest run per user and run date, narrowed by the filter.
    pub async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRow>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT DISTINCT ON (");
        if filter.instance_id.is_some() {
            qb.push("instance_id, ");
        }
        qb.push("user_id, run_date) ");
        qb.push(RUN_COLUMNS);
        qb.push(" FROM performance WHERE TRUE");

        if let Some(instance_id) = filter.instance_id {
            qb.push(" AND instance_id = ").push_bind(instance_id);
        }
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(run_date) = filter.run_date {
            qb.push(" AND run_date = ").push_bind(run_date);
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.clone());
        }

        qb.push(" ORDER BY ");
        if filter.instance_id.is_some() {
            qb.push("instance_id, ");
        }
        qb.push("user_id, run_date DESC, updated_at DESC");

        let rows = qb.build_query_as::<RunRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn runs_for_instance(&self, instance_id: Uuid) -> Result<Vec<RunRow>> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM performance WHERE instance_id = $1 ORDER BY run_date DESC"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn performance_logs(&self, filter: &PerformanceLogFilter) -> Result<Vec<PerformanceLogRow>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(LOG_COLUMNS);
        qb.push(" FROM performance_log WHERE user_id = ")
            .push_bind(filter.user_id.clone());

        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        if let Some(event_type) = &filter.event_type {
            qb.push(" AND event_type = ").push_bind(event_type.clone());
        }

        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build_query_as::<PerformanceLogRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn performance_logs_for_run(&self, performance_id: Uuid) -> Result<Vec<PerformanceLogRow>> {
        let rows = sqlx::query_as::<_, PerformanceLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM performance_log WHERE performance_id = $1 ORDER BY created_at DESC"
        ))
        .bind(performance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_detected() {
        assert!(RunPatch::default().is_empty());
        let patch = RunPatch {
            notes: Some("felt good".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
