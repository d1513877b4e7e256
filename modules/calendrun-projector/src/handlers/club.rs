use async_trait::async_trait;
use calendrun_readmodel::{ClubPatch, NewClub, NewMembership, ReadModel};
use serde_json::Value;
use tracing::{debug, info};

use crate::contracts::club::{ClubCreated, ClubUpdated, MemberJoined, MemberLeft};
use crate::contracts::parse;
use crate::handler::{HandlerError, ProjectionHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClubOp {
    Created,
    Updated,
    MemberJoined,
    MemberLeft,
}

/// Projects `club.0` events into `club` and `club_membership`.
pub struct ClubProjection {
    store: ReadModel,
    op: ClubOp,
}

impl ClubProjection {
    pub fn new(store: ReadModel, op: ClubOp) -> Self {
        Self { store, op }
    }

    async fn created(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let club: ClubCreated = parse(payload)?;
        let record = NewClub {
            id: club.id,
            name: club.name,
            description: club.description,
            invite_token: club.invite_token,
            logo_url: club.logo_url,
            welcome_text: club.welcome_text.map(Value::Object),
            short_description: club.short_description.map(Value::Object),
        };

        let rows = self.store.upsert_club(&record, event_id).await?;
        if rows == 0 {
            debug!(event_id, club_id = %record.id, "Club already at this event");
        }
        Ok(())
    }

    async fn updated(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let update: ClubUpdated = parse(payload)?;
        let patch = ClubPatch {
            name: update.name,
            description: update.description,
            invite_token: update.invite_token,
            logo_url: update.logo_url,
            welcome_text: update.welcome_text.map(Value::Object),
            short_description: update.short_description.map(Value::Object),
        };

        if patch.is_empty() {
            info!(event_id, club_id = %update.id, "No fields to update for club");
            return Ok(());
        }

        let rows = self.store.patch_club(update.id, &patch, event_id).await?;
        if rows == 0 {
            debug!(event_id, club_id = %update.id, "Club update matched no row");
        }
        Ok(())
    }

    async fn member_joined(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let joined: MemberJoined = parse(payload)?;
        let record = NewMembership {
            id: joined.id,
            club_id: joined.club_id,
            user_id: joined.user_id,
            user_name: joined.user_name,
            role: joined.role.as_str().to_string(),
            joined_at: joined.joined_at,
        };

        let rows = self.store.upsert_membership(&record, event_id).await?;
        if rows == 0 {
            debug!(event_id, club_id = %record.club_id, user_id = %record.user_id, "Membership already at this event");
        }
        Ok(())
    }

    async fn member_left(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let left: MemberLeft = parse(payload)?;
        let rows = self
            .store
            .delete_membership(left.club_id, &left.user_id, event_id)
            .await?;
        if rows == 0 {
            debug!(event_id, club_id = %left.club_id, user_id = %left.user_id, "Membership delete matched no row");
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionHandler for ClubProjection {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        match self.op {
            ClubOp::Created => self.created(payload, event_id).await,
            ClubOp::Updated => self.updated(payload, event_id).await,
            ClubOp::MemberJoined => self.member_joined(payload, event_id).await,
            ClubOp::MemberLeft => self.member_left(payload, event_id).await,
        }
    }
}
