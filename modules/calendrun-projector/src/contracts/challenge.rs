use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{Contract, ContractError};

/// Distance variants a challenge can be joined with.
pub const VARIANTS: &[&str] = &[
    "full", "half", "1/8", "2/8", "3/8", "4/8", "5/8", "6/8", "7/8", "8/8", "1/7", "2/7", "3/7",
    "4/7", "5/7", "6/7", "7/7", "1/5", "2/5", "3/5", "4/5", "5/5",
];

fn variant(value: &str) -> Result<(), ContractError> {
    if VARIANTS.contains(&value) {
        Ok(())
    } else {
        Err(ContractError::invalid("variant", format!("unknown variant {value:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    #[default]
    Active,
    Completed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeStarted {
    pub id: Uuid,
    pub template_id: Uuid,
    pub user_id: String,
    pub variant: String,
    pub theme_key: String,
    #[serde(default)]
    pub status: ChallengeStatus,
    pub joined_at: DateTime<Utc>,
}

impl Contract for ChallengeStarted {
    fn validate(&self) -> Result<(), ContractError> {
        variant(&self.variant)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeUpdated {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub variant: Option<String>,
    pub theme_key: Option<String>,
    pub status: Option<ChallengeStatus>,
    pub total_completed_km: Option<f64>,
    pub succeeded: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Contract for ChallengeUpdated {
    fn validate(&self) -> Result<(), ContractError> {
        match &self.variant {
            Some(v) => variant(v),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCompleted {
    pub id: Uuid,
    pub user_id: String,
    pub total_completed_km: f64,
    pub succeeded: bool,
    pub completed_at: DateTime<Utc>,
}

impl Contract for ChallengeCompleted {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::parse;
    use serde_json::json;

    #[test]
    fn started_defaults_to_active() {
        let started: ChallengeStarted = parse(&json!({
            "id": "9d1f0a7c-3b2e-4c5d-8e6f-7a8b9c0d1e2f",
            "templateId": "1a2b3c4d-5e6f-4a8b-9c0d-1e2f3a4b5c6d",
            "userId": "kc-user-1",
            "variant": "3/8",
            "themeKey": "spring",
            "joinedAt": "2025-03-01T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(started.status, ChallengeStatus::Active);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let result = parse::<ChallengeUpdated>(&json!({
            "id": "9d1f0a7c-3b2e-4c5d-8e6f-7a8b9c0d1e2f",
            "variant": "9/8"
        }));
        assert!(matches!(result, Err(ContractError::Invalid { field: "variant", .. })));
    }

    #[test]
    fn completed_requires_all_fields() {
        let result = parse::<ChallengeCompleted>(&json!({
            "id": "9d1f0a7c-3b2e-4c5d-8e6f-7a8b9c0d1e2f",
            "userId": "kc-user-1",
            "succeeded": true
        }));
        assert!(matches!(result, Err(ContractError::Shape(_))));
    }
}
