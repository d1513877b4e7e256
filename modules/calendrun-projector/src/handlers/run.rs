use async_trait::async_trait;
use calendrun_common::events::event_types;
use calendrun_readmodel::{NewRun, PerformanceLogEntry, ReadModel, RunPatch, RunRow};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contracts::run::{RunDeleted, RunLogged, RunUpdated};
use crate::contracts::{change_log, date_part, parse, positive_int};
use crate::handler::{HandlerError, ProjectionHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOp {
    Logged,
    Updated,
    Deleted,
}

impl RunOp {
    fn event_type(&self) -> &'static str {
        match self {
            RunOp::Logged => event_types::RUN_LOGGED,
            RunOp::Updated => event_types::RUN_UPDATED,
            RunOp::Deleted => event_types::RUN_DELETED,
        }
    }
}

/// Projects `run.0` events into `performance`, plus an audit row in
/// `performance_log` per event.
pub struct RunProjection {
    store: ReadModel,
    op: RunOp,
}

impl RunProjection {
    pub fn new(store: ReadModel, op: RunOp) -> Self {
        Self { store, op }
    }

    async fn logged(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let run: RunLogged = parse(payload)?;
        let record = NewRun {
            id: run.id,
            instance_id: run.instance_id,
            user_id: run.user_id.clone(),
            runner_name: run.runner_name.clone(),
            run_date: run.run_date()?,
            actual_run_date: run.actual_run_date()?,
            distance_km: run.distance_km,
            time_minutes: run.time_minutes()?,
            notes: run.notes(),
            status: run.status.as_str().to_string(),
            recorded_at: run.recorded_at,
            change_log: run.change_log()?,
        };

        let rows = self.store.upsert_run(&record, event_id).await?;
        if rows == 0 {
            debug!(event_id, run_id = %run.id, "Run already at this event, write skipped");
        }

        let snapshot = self.snapshot(run.id).await;
        self.audit(event_id, run.id, run.instance_id, &run.user_id, snapshot, payload)
            .await;
        Ok(())
    }

    async fn updated(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let update: RunUpdated = parse(payload)?;
        let patch = RunPatch {
            runner_name: update.runner_name.clone(),
            run_date: update
                .run_date
                .as_deref()
                .map(|d| date_part("runDate", d))
                .transpose()?,
            actual_run_date: update
                .actual_run_date
                .as_deref()
                .map(|d| date_part("actualRunDate", d))
                .transpose()?,
            distance_km: update.distance_km,
            time_minutes: update
                .time_minutes
                .map(|m| positive_int("timeMinutes", m))
                .transpose()?,
            notes: update.notes.clone().map(|n| n.into_string()),
            status: update.status.map(|s| s.as_str().to_string()),
            recorded_at: update.recorded_at,
            change_log: update.change_log.as_ref().map(change_log).transpose()?,
        };

        if patch.is_empty() {
            info!(event_id, run_id = %update.id, "No fields to update for run");
            return Ok(());
        }

        self.store.patch_run(update.id, &patch, event_id).await?;

        // Nothing to audit for a run that was never projected.
        if let Some(snapshot) = self.snapshot(update.id).await {
            self.audit(
                event_id,
                update.id,
                update.instance_id,
                &update.user_id,
                Some(snapshot),
                payload,
            )
            .await;
        }
        Ok(())
    }

    async fn deleted(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let delete: RunDeleted = parse(payload)?;

        let snapshot = self
            .snapshot(delete.id)
            .await
            .filter(|r| r.instance_id == delete.instance_id && r.user_id == delete.user_id);

        self.store
            .delete_run(delete.id, delete.instance_id, &delete.user_id, event_id)
            .await?;

        self.audit(
            event_id,
            delete.id,
            delete.instance_id,
            &delete.user_id,
            snapshot,
            payload,
        )
        .await;
        Ok(())
    }

    async fn snapshot(&self, id: Uuid) -> Option<RunRow> {
        self.store.get_run(id).await.unwrap_or_else(|e| {
            warn!(run_id = %id, error = %e, "Failed to read run snapshot for audit log");
            None
        })
    }

    /// Best-effort: a failed audit write never fails the event.
    async fn audit(
        &self,
        event_id: &str,
        performance_id: Uuid,
        instance_id: Uuid,
        user_id: &str,
        snapshot: Option<RunRow>,
        payload: &Value,
    ) {
        let entry = PerformanceLogEntry {
            event_id: event_id.to_string(),
            event_type: self.op.event_type().to_string(),
            performance_id,
            instance_id,
            user_id: user_id.to_string(),
            snapshot,
            event_payload: payload.clone(),
        };

        if let Err(e) = self.store.append_performance_log(&entry).await {
            warn!(event_id, error = %e, "Failed to write performance log entry");
        }
    }
}

#[async_trait]
impl ProjectionHandler for RunProjection {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        match self.op {
            RunOp::Logged => self.logged(payload, event_id).await,
            RunOp::Updated => self.updated(payload, event_id).await,
            RunOp::Deleted => self.deleted(payload, event_id).await,
        }
    }
}
