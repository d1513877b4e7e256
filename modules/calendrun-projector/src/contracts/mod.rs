//! Payload contracts: the shape each event type must have before a handler
//! may touch the read model. Parsing and validation are pure.

pub mod challenge;
pub mod club;
pub mod run;
pub mod template;
pub mod user;

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("payload does not match contract: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ContractError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ContractError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A payload shape with rules serde alone can't express.
pub trait Contract: DeserializeOwned {
    fn validate(&self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Deserialize and validate a raw payload.
pub fn parse<T: Contract>(payload: &Value) -> Result<T, ContractError> {
    let parsed = T::deserialize(payload)?;
    parsed.validate()?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Date part of an ISO date or date-time string (`2025-03-07` or
/// `2025-03-07T06:30:00Z`).
pub fn date_part(field: &'static str, raw: &str) -> Result<NaiveDate, ContractError> {
    let date = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ContractError::invalid(field, format!("{raw:?} is not an ISO date")))
}

pub fn positive(field: &'static str, value: f64) -> Result<(), ContractError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ContractError::invalid(field, format!("{value} must be positive")))
    }
}

pub fn non_negative(field: &'static str, value: f64) -> Result<(), ContractError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ContractError::invalid(field, format!("{value} must not be negative")))
    }
}

pub fn positive_int(field: &'static str, value: i64) -> Result<i32, ContractError> {
    if value <= 0 {
        return Err(ContractError::invalid(field, format!("{value} must be positive")));
    }
    i32::try_from(value).map_err(|_| ContractError::invalid(field, format!("{value} is too large")))
}

pub fn email(field: &'static str, value: &str) -> Result<(), ContractError> {
    if EMAIL.is_match(value) {
        Ok(())
    } else {
        Err(ContractError::invalid(field, format!("{value:?} is not an email address")))
    }
}

pub fn absolute_url(field: &'static str, value: &str) -> Result<(), ContractError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ContractError::invalid(field, format!("{value:?}: {e}")))
}

/// Free text that older clients sent as a bare number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    pub fn into_string(self) -> String {
        match self {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Number(n) => n.to_string(),
        }
    }
}

/// Normalize a change log. Objects and arrays pass through; strings are
/// parsed as JSON and kept as `{"raw": ...}` when they aren't JSON.
pub fn change_log(value: &Value) -> Result<Value, ContractError> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value.clone()),
        Value::String(s) => Ok(serde_json::from_str(s).unwrap_or_else(|_| json!({ "raw": s }))),
        other => Err(ContractError::invalid(
            "changeLog",
            format!("expected object, array or string, got {other}"),
        )),
    }
}
