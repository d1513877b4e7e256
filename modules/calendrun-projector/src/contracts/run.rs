use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{change_log, date_part, positive, positive_int, Contract, ContractError, TextOrNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Planned,
    #[default]
    Completed,
    Skipped,
    Deleted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Planned => "planned",
            RunStatus::Completed => "completed",
            RunStatus::Skipped => "skipped",
            RunStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogged {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
    pub runner_name: Option<String>,
    pub run_date: String,
    pub actual_run_date: Option<String>,
    pub distance_km: f64,
    pub time_minutes: Option<i64>,
    pub notes: Option<TextOrNumber>,
    #[serde(default)]
    pub status: RunStatus,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
}

impl Contract for RunLogged {
    fn validate(&self) -> Result<(), ContractError> {
        date_part("runDate", &self.run_date)?;
        if let Some(actual) = &self.actual_run_date {
            date_part("actualRunDate", actual)?;
        }
        positive("distanceKm", self.distance_km)?;
        if let Some(minutes) = self.time_minutes {
            positive_int("timeMinutes", minutes)?;
        }
        if let Some(log) = &self.change_log {
            change_log(log)?;
        }
        Ok(())
    }
}

impl RunLogged {
    pub fn run_date(&self) -> Result<NaiveDate, ContractError> {
        date_part("runDate", &self.run_date)
    }

    pub fn actual_run_date(&self) -> Result<Option<NaiveDate>, ContractError> {
        self.actual_run_date
            .as_deref()
            .map(|raw| date_part("actualRunDate", raw))
            .transpose()
    }

    pub fn time_minutes(&self) -> Result<Option<i32>, ContractError> {
        self.time_minutes
            .map(|m| positive_int("timeMinutes", m))
            .transpose()
    }

    pub fn notes(&self) -> Option<String> {
        self.notes.clone().map(TextOrNumber::into_string)
    }

    pub fn change_log(&self) -> Result<Option<Value>, ContractError> {
        self.change_log.as_ref().map(change_log).transpose()
    }
}

/// Every field but the identity triple is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUpdated {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
    pub runner_name: Option<String>,
    pub run_date: Option<String>,
    pub actual_run_date: Option<String>,
    pub distance_km: Option<f64>,
    pub time_minutes: Option<i64>,
    pub notes: Option<TextOrNumber>,
    pub status: Option<RunStatus>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub change_log: Option<Value>,
}

impl Contract for RunUpdated {
    fn validate(&self) -> Result<(), ContractError> {
        if let Some(date) = &self.run_date {
            date_part("runDate", date)?;
        }
        if let Some(actual) = &self.actual_run_date {
            date_part("actualRunDate", actual)?;
        }
        if let Some(distance) = self.distance_km {
            positive("distanceKm", distance)?;
        }
        if let Some(minutes) = self.time_minutes {
            positive_int("timeMinutes", minutes)?;
        }
        if let Some(log) = &self.change_log {
            change_log(log)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDeleted {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub user_id: String,
}

impl Contract for RunDeleted {}
