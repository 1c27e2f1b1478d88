//! Demand planning: turning the shift-type catalog into dated, time-bound
//! planned slots.
//!
//! The effective schedule is a pure function of (catalog defaults, optional
//! override) — never of insertion order — so single and bulk planning go
//! through the same resolution.

use chrono::{NaiveDate, NaiveTime};

use crate::db::{DbPlannedSlot, DbShiftType, NewPlannedSlot, RosterDb};
use crate::RosterError;

/// Explicitly supplied schedule for one slot. Any field left `None` falls
/// back to the shift-type default. A non-empty reason is mandatory.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOverride {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub hours: Option<f64>,
    pub reason: String,
}

/// A resolved schedule plus its lineage: whether it came from the catalog
/// defaults or from an explicit override.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSchedule {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub hours: f64,
    pub uses_override: bool,
    pub override_reason: Option<String>,
}

/// Resolve the effective schedule for a (shift type, override?) pair.
///
/// Without an override, the defaults are copied through; a shift type with
/// null defaults ("variable") fails with `CatalogIncomplete`. With an
/// override, supplied fields win, missing ones fall back to the defaults,
/// and a missing duration is computed as end − start (same-day wall clock).
pub fn resolve_schedule(
    shift_type: &DbShiftType,
    override_: Option<&ScheduleOverride>,
) -> Result<EffectiveSchedule, RosterError> {
    match override_ {
        None => {
            let (Some(start), Some(end)) = (shift_type.default_start, shift_type.default_end)
            else {
                return Err(RosterError::CatalogIncomplete(shift_type.name.clone()));
            };
            let hours = match shift_type.default_hours {
                Some(h) => h,
                None => wall_clock_hours(start, end)?,
            };
            Ok(EffectiveSchedule {
                start,
                end,
                hours,
                uses_override: false,
                override_reason: None,
            })
        }
        Some(ov) => {
            if ov.reason.trim().is_empty() {
                return Err(RosterError::MissingReason("schedule override"));
            }
            let (Some(start), Some(end)) = (
                ov.start.or(shift_type.default_start),
                ov.end.or(shift_type.default_end),
            ) else {
                return Err(RosterError::CatalogIncomplete(shift_type.name.clone()));
            };
            let hours = match ov.hours {
                Some(h) => h,
                None => wall_clock_hours(start, end)?,
            };
            Ok(EffectiveSchedule {
                start,
                end,
                hours,
                uses_override: true,
                override_reason: Some(ov.reason.trim().to_string()),
            })
        }
    }
}

/// Same-day wall-clock span in hours. Overnight shifts are not modeled;
/// an end before start is rejected rather than wrapped.
fn wall_clock_hours(start: NaiveTime, end: NaiveTime) -> Result<f64, RosterError> {
    let minutes = (end - start).num_minutes();
    if minutes < 0 {
        return Err(RosterError::InvalidSchedule(format!(
            "end {} is before start {}",
            end, start
        )));
    }
    Ok(minutes as f64 / 60.0)
}

pub struct DemandPlanner<'a> {
    db: &'a RosterDb,
}

impl<'a> DemandPlanner<'a> {
    pub fn new(db: &'a RosterDb) -> Self {
        Self { db }
    }

    /// Create the planned slot for (date, shift type). Fails with
    /// `DuplicateSlot` if one already exists — the first record is never
    /// overwritten; changes go through `update_planned_slot`.
    pub fn create_planned_slot(
        &self,
        date: NaiveDate,
        shift_type_name: &str,
        override_: Option<&ScheduleOverride>,
        planned_headcount: i32,
        planned_visitors: i32,
    ) -> Result<DbPlannedSlot, RosterError> {
        let day = self
            .db
            .get_day(date)?
            .ok_or_else(|| RosterError::not_found("day", date.to_string()))?;
        let shift_type = self
            .db
            .get_shift_type_by_name(shift_type_name)?
            .ok_or_else(|| RosterError::not_found("shift type", shift_type_name))?;

        let schedule = resolve_schedule(&shift_type, override_)?;

        self.db
            .insert_planned_slot(&NewPlannedSlot {
                day_id: day.id,
                shift_type_id: shift_type.id,
                start_time: schedule.start,
                end_time: schedule.end,
                duration_hours: schedule.hours,
                uses_override: schedule.uses_override,
                override_reason: schedule.override_reason,
                planned_headcount,
                planned_visitors,
            })
            .map_err(|e| {
                if e.is_unique_violation() {
                    RosterError::DuplicateSlot
                } else {
                    e.into()
                }
            })
    }

    /// Re-resolve and replace an existing slot's schedule and headcounts.
    pub fn update_planned_slot(
        &self,
        slot_id: i64,
        override_: Option<&ScheduleOverride>,
        planned_headcount: i32,
        planned_visitors: i32,
    ) -> Result<DbPlannedSlot, RosterError> {
        let slot = self
            .db
            .get_planned_slot(slot_id)?
            .ok_or_else(|| RosterError::not_found("planned slot", slot_id.to_string()))?;
        let shift_type = self
            .db
            .get_shift_type(slot.shift_type_id)?
            .ok_or_else(|| RosterError::not_found("shift type", slot.shift_type_id.to_string()))?;

        let schedule = resolve_schedule(&shift_type, override_)?;
        self.db.update_planned_slot(
            slot_id,
            schedule.start,
            schedule.end,
            schedule.hours,
            schedule.uses_override,
            schedule.override_reason.as_deref(),
            planned_headcount,
            planned_visitors,
        )?;
        self.db
            .get_planned_slot(slot_id)?
            .ok_or_else(|| RosterError::not_found("planned slot", slot_id.to_string()))
    }

    /// Plan one slot per (date, shift type) over [start, end) for every
    /// named shift type, using catalog defaults. Days already planned are
    /// skipped, weekend-only types only land on Saturday/Sunday.
    pub fn plan_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        shift_type_names: &[&str],
        default_headcount: i32,
    ) -> Result<Vec<DbPlannedSlot>, RosterError> {
        let mut created = Vec::new();
        let mut date = start;
        while date < end {
            let day = self
                .db
                .get_day(date)?
                .ok_or_else(|| RosterError::not_found("day", date.to_string()))?;
            for name in shift_type_names {
                let shift_type = self
                    .db
                    .get_shift_type_by_name(name)?
                    .ok_or_else(|| RosterError::not_found("shift type", *name))?;
                if shift_type.weekend_only && day.weekday < 6 {
                    continue;
                }
                match self.create_planned_slot(date, name, None, default_headcount, 0) {
                    Ok(slot) => created.push(slot),
                    Err(RosterError::DuplicateSlot) => {
                        log::debug!("slot {} / {} already planned, skipping", date, name);
                    }
                    Err(e) => return Err(e),
                }
            }
            date = date.succ_opt().ok_or_else(|| {
                RosterError::InvalidSchedule("date overflow while planning".to_string())
            })?;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RosterDb;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn morning() -> DbShiftType {
        DbShiftType {
            id: 1,
            name: "morning".into(),
            description: None,
            default_start: Some(t(8, 45)),
            default_end: Some(t(11, 15)),
            default_hours: Some(2.5),
            weekend_only: false,
            active: true,
        }
    }

    fn variable() -> DbShiftType {
        DbShiftType {
            id: 2,
            name: "event".into(),
            description: None,
            default_start: None,
            default_end: None,
            default_hours: None,
            weekend_only: false,
            active: true,
        }
    }

    #[test]
    fn test_defaults_copied_through_without_override() {
        let s = resolve_schedule(&morning(), None).unwrap();
        assert_eq!(s.start, t(8, 45));
        assert_eq!(s.end, t(11, 15));
        assert_eq!(s.hours, 2.5);
        assert!(!s.uses_override);
        assert!(s.override_reason.is_none());
    }

    #[test]
    fn test_variable_type_without_override_is_catalog_incomplete() {
        let err = resolve_schedule(&variable(), None).unwrap_err();
        assert!(matches!(err, RosterError::CatalogIncomplete(name) if name == "event"));
    }

    #[test]
    fn test_override_requires_reason() {
        let ov = ScheduleOverride {
            start: Some(t(14, 0)),
            end: Some(t(18, 0)),
            hours: None,
            reason: "  ".into(),
        };
        let err = resolve_schedule(&morning(), Some(&ov)).unwrap_err();
        assert!(matches!(err, RosterError::MissingReason(_)));
    }

    #[test]
    fn test_override_computes_missing_duration() {
        let ov = ScheduleOverride {
            start: Some(t(14, 0)),
            end: Some(t(18, 30)),
            hours: None,
            reason: "special event".into(),
        };
        let s = resolve_schedule(&variable(), Some(&ov)).unwrap();
        assert_eq!(s.hours, 4.5);
        assert!(s.uses_override);
        assert_eq!(s.override_reason.as_deref(), Some("special event"));
    }

    #[test]
    fn test_override_partial_falls_back_to_defaults() {
        let ov = ScheduleOverride {
            start: None,
            end: Some(t(12, 45)),
            hours: None,
            reason: "extended".into(),
        };
        let s = resolve_schedule(&morning(), Some(&ov)).unwrap();
        assert_eq!(s.start, t(8, 45));
        assert_eq!(s.end, t(12, 45));
        assert_eq!(s.hours, 4.0);
        assert!(s.uses_override);
    }

    #[test]
    fn test_negative_span_rejected() {
        let ov = ScheduleOverride {
            start: Some(t(18, 0)),
            end: Some(t(8, 0)),
            hours: None,
            reason: "typo".into(),
        };
        let err = resolve_schedule(&variable(), Some(&ov)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidSchedule(_)));
    }

    #[test]
    fn test_create_then_duplicate_slot() {
        let db = RosterDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        db.seed_day(date, false, None).unwrap();
        db.upsert_shift_type("morning", None, Some(t(8, 45)), Some(t(11, 15)), Some(2.5), false)
            .unwrap();

        let planner = DemandPlanner::new(&db);
        let slot = planner
            .create_planned_slot(date, "morning", None, 4, 0)
            .unwrap();
        assert_eq!(slot.duration_hours, 2.5);
        assert!(!slot.uses_override);

        let err = planner
            .create_planned_slot(date, "morning", None, 9, 9)
            .unwrap_err();
        assert!(matches!(err, RosterError::DuplicateSlot));

        // First record unchanged
        let kept = db.get_planned_slot(slot.id).unwrap().unwrap();
        assert_eq!(kept.planned_headcount, 4);
    }

    #[test]
    fn test_unknown_date_is_not_found() {
        let db = RosterDb::open_in_memory().unwrap();
        db.upsert_shift_type("morning", None, Some(t(8, 45)), Some(t(11, 15)), Some(2.5), false)
            .unwrap();
        let planner = DemandPlanner::new(&db);
        let err = planner
            .create_planned_slot(NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(), "morning", None, 1, 0)
            .unwrap_err();
        assert!(matches!(err, RosterError::NotFound { entity: "day", .. }));
    }

    #[test]
    fn test_plan_period_bulk_matches_single_resolution() {
        let db = RosterDb::open_in_memory().unwrap();
        let start = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(); // Monday
        let end = NaiveDate::from_ymd_opt(2025, 12, 22).unwrap();
        let mut d = start;
        while d < end {
            db.seed_day(d, false, None).unwrap();
            d = d.succ_opt().unwrap();
        }
        db.upsert_shift_type("morning", None, Some(t(8, 45)), Some(t(11, 15)), Some(2.5), false)
            .unwrap();
        db.upsert_shift_type("weekend", None, Some(t(10, 0)), Some(t(14, 0)), None, true)
            .unwrap();

        let planner = DemandPlanner::new(&db);
        let created = planner
            .plan_period(start, end, &["morning", "weekend"], 3)
            .unwrap();
        // morning every day, weekend only Sat+Sun
        assert_eq!(created.len(), 7 + 2);
        // weekend hours computed from defaults since default_hours is null
        let weekend = created.iter().find(|s| s.duration_hours == 4.0).unwrap();
        assert!(!weekend.uses_override);

        // Re-planning is a no-op thanks to DuplicateSlot skipping
        let again = planner
            .plan_period(start, end, &["morning", "weekend"], 3)
            .unwrap();
        assert!(again.is_empty());
    }
}
