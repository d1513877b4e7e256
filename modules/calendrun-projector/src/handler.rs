use async_trait::async_trait;
use calendrun_readmodel::ReadModelError;
use serde_json::Value;
use thiserror::Error;

use crate::contracts::ContractError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ContractError),

    #[error("store write failed: {0}")]
    Store(#[from] ReadModelError),
}

/// Applies one event type to the read model.
///
/// Implementations must be idempotent per `(payload, event_id)`: every write
/// is conditioned on the stored last-applied event id differing from
/// `event_id`, so a redelivered event changes nothing.
#[async_trait]
pub trait ProjectionHandler: Send + Sync {
    async fn apply(&self, payload: &Value, event_id: &str) -> Result<(), HandlerError>;
}
