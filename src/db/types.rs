//! Shared type definitions for the database layer.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl DbError {
    /// True if the underlying SQLite error is a UNIQUE (or primary key)
    /// violation. Callers translate these into domain-level duplicate
    /// errors instead of treating them as crashes — concurrent writers are
    /// expected. Checks the extended code: other constraint classes (FK,
    /// NOT NULL, CHECK) are not duplicates and must not be reported as one.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

/// A row from the `days` table. Immutable once seeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDay {
    pub id: i64,
    pub date: NaiveDate,
    pub week_of_year: i32,
    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub weekday: i32,
    pub is_holiday: bool,
    pub holiday_label: Option<String>,
}

/// A row from the `shift_types` catalog.
///
/// `default_start`/`default_end` are `None` for "variable" shift types whose
/// schedule must be supplied at planning time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbShiftType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub default_start: Option<NaiveTime>,
    pub default_end: Option<NaiveTime>,
    pub default_hours: Option<f64>,
    pub weekend_only: bool,
    pub active: bool,
}

/// A row from the `people` table. Master data owned by an external service;
/// this crate only reads it (and mirrors it during sync).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPerson {
    pub id: i64,
    pub dni: String,
    pub last_name: String,
    pub first_name: String,
    pub cohort: Option<i32>,
    pub email: Option<String>,
    pub active: bool,
}

/// A row from `planned_slots`: one (day, shift type) demand record with a
/// resolved effective schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPlannedSlot {
    pub id: i64,
    pub day_id: i64,
    pub shift_type_id: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: f64,
    /// True when the schedule was explicitly supplied rather than copied
    /// from the shift-type defaults.
    pub uses_override: bool,
    pub override_reason: Option<String>,
    pub planned_headcount: i32,
    pub planned_visitors: i32,
}

/// Lifecycle state of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    Active,
    Fulfilled,
    AbsentCredited,
    Cancelled,
}

impl AssignmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Active => "active",
            AssignmentState::Fulfilled => "fulfilled",
            AssignmentState::AbsentCredited => "absent_credited",
            AssignmentState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AssignmentState::Active),
            "fulfilled" => Some(AssignmentState::Fulfilled),
            "absent_credited" => Some(AssignmentState::AbsentCredited),
            "cancelled" => Some(AssignmentState::Cancelled),
            _ => None,
        }
    }

    /// Whether this state contributes hours to a balance (credited absences
    /// count the same as attended shifts).
    pub fn counts_toward_balance(&self) -> bool {
        matches!(self, AssignmentState::Fulfilled | AssignmentState::AbsentCredited)
    }

    /// Legal lifecycle transitions. Cancellation is reachable from both
    /// `active` and `fulfilled` (administrative corrections); everything
    /// else is terminal.
    pub fn can_transition_to(&self, next: AssignmentState) -> bool {
        use AssignmentState::*;
        matches!(
            (self, next),
            (Active, Fulfilled) | (Active, AbsentCredited) | (Active, Cancelled) | (Fulfilled, Cancelled)
        )
    }
}

/// A row from the `assignments` table. Append-dominant: after creation only
/// `state`, `shift_cancelled` and `change_reason` ever change — never who,
/// what, or when.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAssignment {
    pub id: i64,
    pub person_id: i64,
    pub slot_id: i64,
    /// Occurrence date, denormalized from the slot's day for query convenience.
    pub date: NaiveDate,
    pub state: AssignmentState,
    /// Set on cancellation, independent of `state` on the wire so historical
    /// imports can carry both.
    pub shift_cancelled: bool,
    /// Back-reference to the assignment this record replaces (cancel+relink).
    pub replaces_assignment_id: Option<i64>,
    pub change_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Column codecs. Dates and times are stored as TEXT (`YYYY-MM-DD`,
// `HH:MM:SS`); parse failures surface as conversion errors so a corrupt row
// fails loudly instead of being silently defaulted.
// ---------------------------------------------------------------------------

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";
pub(crate) const TIME_FMT: &str = "%H:%M:%S";

pub(crate) fn date_to_sql(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

pub(crate) fn time_to_sql(t: NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

pub(crate) fn date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn time_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    NaiveTime::parse_from_str(&s, TIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_time_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(None),
        Some(s) => NaiveTime::parse_from_str(&s, TIME_FMT).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

pub(crate) fn state_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<AssignmentState> {
    let s: String = row.get(idx)?;
    AssignmentState::parse(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown assignment state '{}'", s).into(),
        )
    })
}
