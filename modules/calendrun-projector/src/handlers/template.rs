use async_trait::async_trait;
use calendrun_readmodel::{NewTemplate, ReadModel, TemplatePatch};
use serde_json::Value;
use tracing::{debug, info};

use crate::contracts::template::{TemplateCreated, TemplateDeleted, TemplateUpdated};
use crate::contracts::{parse, positive_int};
use crate::handler::{HandlerError, ProjectionHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOp {
    Created,
    Updated,
    Deleted,
}

/// Projects `challenge.template.0` events into `challenge_template`.
/// Start and end instants are stored as their UTC calendar dates.
pub struct TemplateProjection {
    store: ReadModel,
    op: TemplateOp,
}

impl TemplateProjection {
    pub fn new(store: ReadModel, op: TemplateOp) -> Self {
        Self { store, op }
    }

    async fn created(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let created: TemplateCreated = parse(payload)?;
        let record = NewTemplate {
            id: created.id,
            name: created.name,
            description: created.description,
            start_date: created.start_date.date_naive(),
            end_date: created.end_date.date_naive(),
            days: positive_int("days", created.days)?,
            required_distances_km: created.required_distances_km,
            full_distance_total_km: created.full_distance_total_km,
            half_distance_total_km: created.half_distance_total_km,
            theme_key: created.theme_key,
        };

        let rows = self.store.upsert_template(&record, event_id).await?;
        if rows == 0 {
            debug!(event_id, template_id = %record.id, "Template already at this event");
        }
        Ok(())
    }

    async fn updated(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let update: TemplateUpdated = parse(payload)?;
        let patch = TemplatePatch {
            name: update.name,
            description: update.description,
            start_date: update.start_date.map(|d| d.date_naive()),
            end_date: update.end_date.map(|d| d.date_naive()),
            days: update.days.map(|d| positive_int("days", d)).transpose()?,
            required_distances_km: update.required_distances_km,
            full_distance_total_km: update.full_distance_total_km,
            half_distance_total_km: update.half_distance_total_km,
            theme_key: update.theme_key,
        };

        if patch.is_empty() {
            info!(event_id, template_id = %update.id, "No fields to update for template");
            return Ok(());
        }

        let rows = self.store.patch_template(update.id, &patch, event_id).await?;
        if rows == 0 {
            debug!(event_id, template_id = %update.id, "Template update matched no row");
        }
        Ok(())
    }

    async fn deleted(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let deleted: TemplateDeleted = parse(payload)?;
        let rows = self.store.delete_template(deleted.id, event_id).await?;
        if rows == 0 {
            debug!(event_id, template_id = %deleted.id, "Template delete matched no row");
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionHandler for TemplateProjection {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        match self.op {
            TemplateOp::Created => self.created(payload, event_id).await,
            TemplateOp::Updated => self.updated(payload, event_id).await,
            TemplateOp::Deleted => self.deleted(payload, event_id).await,
        }
    }
}
