//! Wire row types for the remote store tables.
//!
//! Column names mirror the store schema (snake_case). `id` is the store's
//! surrogate key: present on reads, omitted on upsert payloads — writes are
//! keyed by each table's natural unique key, never by surrogate id.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{StoreClient, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub week_of_year: i32,
    pub weekday: i32,
    pub is_holiday: bool,
    #[serde(default)]
    pub holiday_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftTypeRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_start: Option<NaiveTime>,
    #[serde(default)]
    pub default_end: Option<NaiveTime>,
    #[serde(default)]
    pub default_hours: Option<f64>,
    #[serde(default)]
    pub weekend_only: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub dni: String,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub cohort: Option<i32>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedSlotRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub day_id: i64,
    pub shift_type_id: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: f64,
    pub uses_override: bool,
    #[serde(default)]
    pub override_reason: Option<String>,
    #[serde(default)]
    pub planned_headcount: i32,
    #[serde(default)]
    pub planned_visitors: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub person_id: i64,
    pub slot_id: i64,
    pub date: NaiveDate,
    pub state: String,
    pub shift_cancelled: bool,
    #[serde(default)]
    pub replaces_assignment_id: Option<i64>,
    #[serde(default)]
    pub change_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Assignment row projected for balance computation, with the slot's
/// effective duration embedded by the store
/// (`select=state,shift_cancelled,slot:planned_slots(duration_hours)`).
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRow {
    pub state: String,
    pub shift_cancelled: bool,
    #[serde(default)]
    pub slot: Option<SlotDuration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotDuration {
    pub duration_hours: f64,
}

impl StoreClient {
    /// Fetch the balance-relevant assignment rows for a person whose slot
    /// occurrence date falls in [start, end). Paginated like any other read.
    pub async fn fetch_balance_rows(
        &self,
        person_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BalanceRow>, StoreError> {
        let person = format!("eq.{}", person_id);
        let gte = format!("gte.{}", start.format("%Y-%m-%d"));
        let lt = format!("lt.{}", end.format("%Y-%m-%d"));
        self.fetch_all(
            "assignments",
            &[
                ("select", "state,shift_cancelled,slot:planned_slots(duration_hours)"),
                ("person_id", person.as_str()),
                ("date", gte.as_str()),
                ("date", lt.as_str()),
            ],
        )
        .await
    }
}
