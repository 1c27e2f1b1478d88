//! Reconciliation of the tabular edit surface against the remote store.
//!
//! Batches arrive as raw header->cell rows, one batch per table. Each
//! batch loads its reference maps once, then processes rows independently:
//! a bad row is reported with a human-readable message naming the field
//! and the rest of the batch proceeds. Re-running a batch is safe — every
//! write is a natural-key upsert.
//!
//! Tables are pushed in dependency order (`SyncTable::ORDERED`) so that
//! later batches can resolve references created by earlier ones.

pub mod backend;
pub mod parse;
pub mod refs;

use std::collections::HashMap;

use chrono::Datelike;

use crate::db::{AssignmentState, DbShiftType};
use crate::planner::{resolve_schedule, ScheduleOverride};
use crate::postgrest::rows::{AssignmentRow, DayRow, PersonRow, PlannedSlotRow, ShiftTypeRow};
use crate::postgrest::StoreError;
use crate::RosterError;
use backend::StoreBackend;
use refs::RefMaps;

/// The five synchronized tables, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTable {
    Days,
    ShiftTypes,
    People,
    PlannedSlots,
    Assignments,
}

impl SyncTable {
    /// Push order: referenced tables before referencing ones.
    pub const ORDERED: [SyncTable; 5] = [
        SyncTable::Days,
        SyncTable::ShiftTypes,
        SyncTable::People,
        SyncTable::PlannedSlots,
        SyncTable::Assignments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTable::Days => "days",
            SyncTable::ShiftTypes => "shift_types",
            SyncTable::People => "people",
            SyncTable::PlannedSlots => "planned_slots",
            SyncTable::Assignments => "assignments",
        }
    }

    pub fn from_name(name: &str) -> Option<SyncTable> {
        SyncTable::ORDERED
            .into_iter()
            .find(|t| t.as_str() == name.trim().to_lowercase())
    }
}

/// One raw row from the edit surface: lowercased header -> cell text.
#[derive(Debug, Clone, Default)]
pub struct SheetRow {
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let cells = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
            .collect();
        SheetRow { cells }
    }

    /// Trimmed cell content, `None` when the column is absent or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        let cell = self.cells.get(column)?.trim();
        (!cell.is_empty()).then_some(cell)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// Per-row reconciliation outcome, written back as the row's status marker.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Applied { warning: Option<String> },
    Skipped,
    Failed(String),
}

impl RowOutcome {
    /// The status text pushed back to the row's sync column.
    pub fn status_marker(&self) -> String {
        match self {
            RowOutcome::Applied { warning: None } => "OK".to_string(),
            RowOutcome::Applied {
                warning: Some(warning),
            } => format!("OK ⚠ {}", warning),
            RowOutcome::Skipped => String::new(),
            RowOutcome::Failed(message) => format!("Error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowResult {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(results: &[RowResult]) -> Self {
        let mut summary = BatchSummary::default();
        for r in results {
            match r.outcome {
                RowOutcome::Applied { .. } => summary.applied += 1,
                RowOutcome::Skipped => summary.skipped += 1,
                RowOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct Reconciler<'a> {
    backend: &'a dyn StoreBackend,
}

impl<'a> Reconciler<'a> {
    pub fn new(backend: &'a dyn StoreBackend) -> Self {
        Reconciler { backend }
    }

    /// Reconcile one batch against the store. Row-level problems land in
    /// the returned results; only batch-level failures (reference-map
    /// loading) abort the call.
    pub async fn reconcile(
        &self,
        table: SyncTable,
        rows: &[SheetRow],
    ) -> Result<Vec<RowResult>, RosterError> {
        let with_slots = matches!(table, SyncTable::PlannedSlots | SyncTable::Assignments);
        let with_assignments = matches!(table, SyncTable::Assignments);
        let mut refs = RefMaps::load(self.backend, with_slots, with_assignments).await?;

        let mut results = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let outcome = if row.is_blank() {
                RowOutcome::Skipped
            } else {
                match self.apply_row(table, row, &mut refs).await {
                    Ok(warning) => RowOutcome::Applied { warning },
                    Err(message) => RowOutcome::Failed(message),
                }
            };
            if let RowOutcome::Failed(ref message) = outcome {
                log::warn!("{} row {}: {}", table.as_str(), index + 1, message);
            }
            results.push(RowResult { index, outcome });
        }

        let summary = BatchSummary::of(&results);
        log::info!(
            "{}: {} applied, {} skipped, {} failed",
            table.as_str(),
            summary.applied,
            summary.skipped,
            summary.failed
        );
        Ok(results)
    }

    async fn apply_row(
        &self,
        table: SyncTable,
        row: &SheetRow,
        refs: &mut RefMaps,
    ) -> Result<Option<String>, String> {
        match table {
            SyncTable::Days => {
                let day = build_day_row(row)?;
                self.backend
                    .upsert_day(&day)
                    .await
                    .map_err(|e| upsert_failure(table, e))?;
                Ok(None)
            }
            SyncTable::ShiftTypes => {
                let st = build_shift_type_row(row)?;
                self.backend
                    .upsert_shift_type(&st)
                    .await
                    .map_err(|e| upsert_failure(table, e))?;
                Ok(None)
            }
            SyncTable::People => {
                let person = build_person_row(row)?;
                self.backend
                    .upsert_person(&person)
                    .await
                    .map_err(|e| upsert_failure(table, e))?;
                Ok(None)
            }
            SyncTable::PlannedSlots => {
                let slot = build_slot_row(row, refs)?;
                self.backend
                    .upsert_slot(&slot)
                    .await
                    .map_err(|e| upsert_failure(table, e))?;
                Ok(None)
            }
            SyncTable::Assignments => {
                let built = build_assignment_row(row, refs)?;
                self.backend
                    .upsert_assignment(&built.row)
                    .await
                    .map_err(|e| upsert_failure(table, e))?;
                if built.row.state != "cancelled" {
                    refs.note_occupancy(built.row.person_id, built.row.date, built.shift_type_id);
                }
                Ok(built.warning)
            }
        }
    }
}

/// Map an upsert failure to the row's error message. A 409 from the store
/// is a uniqueness race with a concurrent writer, reported against the
/// table's own natural key rather than as a raw HTTP status.
fn upsert_failure(table: SyncTable, err: RosterError) -> String {
    match err {
        RosterError::Store(StoreError::ApiError { status: 409, .. }) => match table {
            SyncTable::Days => "a day with this date already exists".to_string(),
            SyncTable::ShiftTypes => "a shift type with this name already exists".to_string(),
            SyncTable::People => "a person with this national ID already exists".to_string(),
            SyncTable::PlannedSlots => RosterError::DuplicateSlot.to_string(),
            SyncTable::Assignments => RosterError::DuplicateActiveAssignment.to_string(),
        },
        other => other.to_string(),
    }
}

fn required<'r>(row: &'r SheetRow, column: &str) -> Result<&'r str, String> {
    row.get(column)
        .ok_or_else(|| format!("missing required column '{}'", column))
}

fn reference_not_found(field: &'static str, value: &str) -> String {
    RosterError::ReferenceNotFound {
        field,
        value: value.to_string(),
    }
    .to_string()
}

fn cell_date(cell: &str) -> Result<chrono::NaiveDate, String> {
    parse::parse_date(cell).ok_or_else(|| format!("unparseable date: '{}'", cell))
}

fn cell_time(cell: &str) -> Result<chrono::NaiveTime, String> {
    parse::parse_time(cell).ok_or_else(|| format!("unparseable time: '{}'", cell))
}

fn cell_flag(cell: &str) -> Result<bool, String> {
    parse::parse_flag(cell).ok_or_else(|| format!("unparseable yes/no value: '{}'", cell))
}

fn cell_number(cell: &str) -> Result<f64, String> {
    // Comma decimals show up in hand-typed sheets
    cell.trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| format!("unparseable number: '{}'", cell))
}

fn cell_int(cell: &str) -> Result<i32, String> {
    cell.trim()
        .parse::<i32>()
        .map_err(|_| format!("unparseable integer: '{}'", cell))
}

fn build_day_row(row: &SheetRow) -> Result<DayRow, String> {
    let date = cell_date(required(row, "date")?)?;
    let is_holiday = match row.get("holiday") {
        Some(cell) => cell_flag(cell)?,
        None => false,
    };
    Ok(DayRow {
        id: None,
        date,
        week_of_year: date.iso_week().week() as i32,
        weekday: date.weekday().number_from_monday() as i32,
        is_holiday,
        holiday_label: row.get("holiday_label").map(str::to_string),
    })
}

fn build_shift_type_row(row: &SheetRow) -> Result<ShiftTypeRow, String> {
    let name = required(row, "name")?.to_string();
    let default_start = row.get("start").map(cell_time).transpose()?;
    let default_end = row.get("end").map(cell_time).transpose()?;
    let default_hours = row.get("hours").map(cell_number).transpose()?;
    let weekend_only = match row.get("weekend_only") {
        Some(cell) => cell_flag(cell)?,
        None => false,
    };
    let active = match row.get("active") {
        Some(cell) => cell_flag(cell)?,
        None => true,
    };
    Ok(ShiftTypeRow {
        id: None,
        name,
        description: row.get("description").map(str::to_string),
        default_start,
        default_end,
        default_hours,
        weekend_only,
        active,
    })
}

fn build_person_row(row: &SheetRow) -> Result<PersonRow, String> {
    let dni = parse::normalize_dni(required(row, "dni")?);
    if dni.is_empty() {
        return Err("missing required column 'dni'".to_string());
    }
    Ok(PersonRow {
        id: None,
        dni,
        last_name: required(row, "last_name")?.to_string(),
        first_name: required(row, "first_name")?.to_string(),
        cohort: row.get("cohort").map(cell_int).transpose()?,
        email: row.get("email").map(str::to_string),
        active: match row.get("active") {
            Some(cell) => cell_flag(cell)?,
            None => true,
        },
    })
}

/// A shift-type wire row viewed through the planner's catalog type, so
/// sheet-sourced slots resolve their schedule exactly like locally planned
/// ones.
fn catalog_entry(row: &ShiftTypeRow) -> DbShiftType {
    DbShiftType {
        id: row.id.unwrap_or_default(),
        name: row.name.clone(),
        description: row.description.clone(),
        default_start: row.default_start,
        default_end: row.default_end,
        default_hours: row.default_hours,
        weekend_only: row.weekend_only,
        active: row.active,
    }
}

fn build_slot_row(row: &SheetRow, refs: &RefMaps) -> Result<PlannedSlotRow, String> {
    let date_cell = required(row, "date")?;
    let date = cell_date(date_cell)?;
    let day_id = refs
        .resolve_day(date)
        .ok_or_else(|| reference_not_found("calendar day", date_cell))?;

    let name = required(row, "shift_type")?;
    let shift_type = refs
        .resolve_shift_type(name)
        .ok_or_else(|| reference_not_found("shift type", name))?;
    let shift_type_id = shift_type
        .id
        .ok_or_else(|| reference_not_found("shift type", name))?;

    let start = row.get("start").map(cell_time).transpose()?;
    let end = row.get("end").map(cell_time).transpose()?;
    let hours = row.get("hours").map(cell_number).transpose()?;
    let override_ = if start.is_some() || end.is_some() || hours.is_some() {
        Some(ScheduleOverride {
            start,
            end,
            hours,
            reason: row.get("reason").unwrap_or("Manual").to_string(),
        })
    } else {
        None
    };

    let schedule =
        resolve_schedule(&catalog_entry(shift_type), override_.as_ref()).map_err(|e| e.to_string())?;

    Ok(PlannedSlotRow {
        id: None,
        day_id,
        shift_type_id,
        start_time: schedule.start,
        end_time: schedule.end,
        duration_hours: schedule.hours,
        uses_override: schedule.uses_override,
        override_reason: schedule.override_reason,
        planned_headcount: row.get("headcount").map(cell_int).transpose()?.unwrap_or(1),
        planned_visitors: row.get("visitors").map(cell_int).transpose()?.unwrap_or(0),
    })
}

struct BuiltAssignment {
    row: AssignmentRow,
    shift_type_id: i64,
    warning: Option<String>,
}

fn build_assignment_row(row: &SheetRow, refs: &RefMaps) -> Result<BuiltAssignment, String> {
    let person_cell = required(row, "person")?;
    let person_id = refs
        .resolve_person(person_cell)
        .ok_or_else(|| reference_not_found("person", person_cell))?;

    let date_cell = required(row, "date")?;
    let date = cell_date(date_cell)?;
    let day_id = refs
        .resolve_day(date)
        .ok_or_else(|| reference_not_found("calendar day", date_cell))?;

    let name = required(row, "shift_type")?;
    let shift_type_id = refs
        .resolve_shift_type(name)
        .and_then(|st| st.id)
        .ok_or_else(|| reference_not_found("shift type", name))?;

    // Assignments only attach to planned demand
    let slot_id = refs.resolve_slot(day_id, shift_type_id).ok_or_else(|| {
        RosterError::SlotNotPlanned {
            date,
            shift_type: name.to_string(),
        }
        .to_string()
    })?;

    let state = match row.get("state") {
        Some(cell) => AssignmentState::parse(&cell.to_lowercase())
            .ok_or_else(|| format!("unknown assignment state: '{}'", cell))?,
        None => AssignmentState::Active,
    };
    let shift_cancelled = match row.get("cancelled") {
        Some(cell) => cell_flag(cell)?,
        None => false,
    };

    let warning = (state != AssignmentState::Cancelled
        && refs.is_double_shift(person_id, date, shift_type_id))
    .then(|| format!("already holds another shift on {}", date));

    Ok(BuiltAssignment {
        row: AssignmentRow {
            id: None,
            person_id,
            slot_id,
            date,
            state: state.as_str().to_string(),
            shift_cancelled,
            replaces_assignment_id: None,
            change_reason: row.get("reason").map(str::to_string),
        },
        shift_type_id,
        warning,
    })
}
