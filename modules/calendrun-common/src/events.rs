//! Flow and event-type names as they appear on the remote event log.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod flows {
    pub const RUN: &str = "run.0";
    pub const CHALLENGE: &str = "challenge.0";
    pub const CHALLENGE_TEMPLATE: &str = "challenge.template.0";
    pub const CLUB: &str = "club.0";
    pub const USER: &str = "user.0";
}

pub mod event_types {
    pub const RUN_LOGGED: &str = "run.logged.0";
    pub const RUN_UPDATED: &str = "run.updated.0";
    pub const RUN_DELETED: &str = "run.deleted.0";

    pub const CHALLENGE_STARTED: &str = "challenge.started.0";
    pub const CHALLENGE_UPDATED: &str = "challenge.updated.0";
    pub const CHALLENGE_COMPLETED: &str = "challenge.completed.0";

    pub const TEMPLATE_CREATED: &str = "challenge.template.created.0";
    pub const TEMPLATE_UPDATED: &str = "challenge.template.updated.0";
    pub const TEMPLATE_DELETED: &str = "challenge.template.deleted.0";

    pub const CLUB_CREATED: &str = "club.created.0";
    pub const CLUB_UPDATED: &str = "club.updated.0";
    pub const CLUB_MEMBER_JOINED: &str = "club.member.joined.0";
    pub const CLUB_MEMBER_LEFT: &str = "club.member.left.0";

    pub const USER_CREATED: &str = "user.created.0";
    pub const USER_UPDATED: &str = "user.updated.0";
}

/// A (flow type, event type) pair; the unit of dispatch and of caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub flow_type: String,
    pub event_type: String,
}

impl EventKey {
    pub fn new(flow_type: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            flow_type: flow_type.into(),
            event_type: event_type.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.flow_type, self.event_type)
    }
}
