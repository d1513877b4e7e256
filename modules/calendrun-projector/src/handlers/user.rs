use async_trait::async_trait;
use calendrun_readmodel::ReadModel;
use serde_json::Value;
use tracing::{debug, info};

use crate::contracts::parse;
use crate::contracts::user::UserChanged;
use crate::handler::{HandlerError, ProjectionHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOp {
    Created,
    Updated,
}

/// Projects `user.0` events into `app_user`. Creation merges into an
/// existing row; an update only touches a user that is already projected.
pub struct UserProjection {
    store: ReadModel,
    op: UserOp,
}

impl UserProjection {
    pub fn new(store: ReadModel, op: UserOp) -> Self {
        Self { store, op }
    }
}

#[async_trait]
impl ProjectionHandler for UserProjection {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let user: UserChanged = parse(payload)?;
        let name = user.name.as_deref();
        let email = user.email.as_deref();

        let rows = match self.op {
            UserOp::Created => self.store.upsert_user(&user.id, name, email, event_id).await?,
            UserOp::Updated => {
                if name.is_none() && email.is_none() {
                    info!(event_id, user_id = %user.id, "No fields to update for user");
                    return Ok(());
                }
                self.store.patch_user(&user.id, name, email, event_id).await?
            }
        };

        if rows == 0 {
            debug!(event_id, user_id = %user.id, op = ?self.op, "User write matched no row");
        }
        Ok(())
    }
}
