use async_trait::async_trait;
use calendrun_readmodel::{ChallengePatch, NewChallenge, ReadModel};
use serde_json::Value;
use tracing::{debug, info};

use crate::contracts::challenge::{ChallengeCompleted, ChallengeStarted, ChallengeUpdated};
use crate::contracts::parse;
use crate::handler::{HandlerError, ProjectionHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOp {
    Started,
    Updated,
    Completed,
}

/// Projects `challenge.0` events into `challenge_instance`.
pub struct ChallengeProjection {
    store: ReadModel,
    op: ChallengeOp,
}

impl ChallengeProjection {
    pub fn new(store: ReadModel, op: ChallengeOp) -> Self {
        Self { store, op }
    }

    async fn started(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let started: ChallengeStarted = parse(payload)?;
        let record = NewChallenge {
            id: started.id,
            template_id: started.template_id,
            user_id: started.user_id,
            variant: started.variant,
            theme_key: started.theme_key,
            status: started.status.as_str().to_string(),
            joined_at: started.joined_at,
        };

        let rows = self.store.upsert_challenge(&record, event_id).await?;
        if rows == 0 {
            debug!(event_id, challenge_id = %record.id, "Challenge already at this event");
        }
        Ok(())
    }

    async fn updated(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let update: ChallengeUpdated = parse(payload)?;
        let patch = ChallengePatch {
            template_id: update.template_id,
            user_id: update.user_id,
            variant: update.variant,
            theme_key: update.theme_key,
            status: update.status.map(|s| s.as_str().to_string()),
            total_completed_km: update.total_completed_km,
            succeeded: update.succeeded,
            completed_at: update.completed_at,
        };

        if patch.is_empty() {
            info!(event_id, challenge_id = %update.id, "No fields to update for challenge");
            return Ok(());
        }

        let rows = self.store.patch_challenge(update.id, &patch, event_id).await?;
        if rows == 0 {
            debug!(event_id, challenge_id = %update.id, "Challenge update matched no row");
        }
        Ok(())
    }

    async fn completed(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let done: ChallengeCompleted = parse(payload)?;
        let rows = self
            .store
            .complete_challenge(
                done.id,
                &done.user_id,
                done.total_completed_km,
                done.succeeded,
                done.completed_at,
                event_id,
            )
            .await?;
        if rows == 0 {
            debug!(event_id, challenge_id = %done.id, "Challenge completion matched no row");
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionHandler for ChallengeProjection {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        match self.op {
            ChallengeOp::Started => self.started(payload, event_id).await,
            ChallengeOp::Updated => self.updated(payload, event_id).await,
            ChallengeOp::Completed => self.completed(payload, event_id).await,
        }
    }
}
