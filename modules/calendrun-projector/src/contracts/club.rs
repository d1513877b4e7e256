use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{absolute_url, Contract, ContractError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubCreated {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub invite_token: String,
    pub logo_url: Option<String>,
    pub welcome_text: Option<Map<String, Value>>,
    pub short_description: Option<Map<String, Value>>,
}

impl Contract for ClubCreated {
    fn validate(&self) -> Result<(), ContractError> {
        match &self.logo_url {
            Some(url) => absolute_url("logoUrl", url),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubUpdated {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub invite_token: Option<String>,
    pub logo_url: Option<String>,
    pub welcome_text: Option<Map<String, Value>>,
    pub short_description: Option<Map<String, Value>>,
}

impl Contract for ClubUpdated {
    fn validate(&self) -> Result<(), ContractError> {
        match &self.logo_url {
            Some(url) => absolute_url("logoUrl", url),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberJoined {
    pub id: Uuid,
    pub club_id: Uuid,
    pub user_id: String,
    pub user_name: Option<String>,
    #[serde(default)]
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl Contract for MemberJoined {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLeft {
    pub id: Uuid,
    pub club_id: Uuid,
    pub user_id: String,
}

impl Contract for MemberLeft {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::parse;
    use serde_json::json;

    #[test]
    fn club_created_rejects_relative_logo_url() {
        let result = parse::<ClubCreated>(&json!({
            "id": "3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7",
            "name": "Morning Milers",
            "inviteToken": "abc123",
            "logoUrl": "/logo.png"
        }));
        assert!(matches!(result, Err(ContractError::Invalid { field: "logoUrl", .. })));
    }

    #[test]
    fn welcome_text_must_be_an_object() {
        let result = parse::<ClubCreated>(&json!({
            "id": "3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7",
            "name": "Morning Milers",
            "inviteToken": "abc123",
            "welcomeText": "hello"
        }));
        assert!(matches!(result, Err(ContractError::Shape(_))));
    }

    #[test]
    fn member_joined_defaults_to_member_role() {
        let joined: MemberJoined = parse(&json!({
            "id": "6a7b8c9d-0e1f-4a2b-8c3d-4e5f6a7b8c9d",
            "clubId": "3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7",
            "userId": "kc-user-1",
            "joinedAt": "2025-03-07T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(joined.role, MemberRole::Member);
        assert!(joined.user_name.is_none());
    }
}
