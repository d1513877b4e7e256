use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{non_negative, positive_int, Contract, ContractError};

fn distances(values: &[f64]) -> Result<(), ContractError> {
    values
        .iter()
        .try_for_each(|d| non_negative("requiredDistancesKm", *d))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCreated {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub days: i64,
    pub required_distances_km: Vec<f64>,
    pub full_distance_total_km: f64,
    pub half_distance_total_km: f64,
    pub theme_key: String,
}

impl Contract for TemplateCreated {
    fn validate(&self) -> Result<(), ContractError> {
        positive_int("days", self.days)?;
        distances(&self.required_distances_km)?;
        non_negative("fullDistanceTotalKm", self.full_distance_total_km)?;
        non_negative("halfDistanceTotalKm", self.half_distance_total_km)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdated {
    pub id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub days: Option<i64>,
    pub required_distances_km: Option<Vec<f64>>,
    pub full_distance_total_km: Option<f64>,
    pub half_distance_total_km: Option<f64>,
    pub theme_key: Option<String>,
}

impl Contract for TemplateUpdated {
    fn validate(&self) -> Result<(), ContractError> {
        if let Some(days) = self.days {
            positive_int("days", days)?;
        }
        if let Some(required) = &self.required_distances_km {
            distances(required)?;
        }
        if let Some(full) = self.full_distance_total_km {
            non_negative("fullDistanceTotalKm", full)?;
        }
        if let Some(half) = self.half_distance_total_km {
            non_negative("halfDistanceTotalKm", half)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDeleted {
    pub id: Uuid,
}

impl Contract for TemplateDeleted {}
