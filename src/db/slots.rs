use chrono::{NaiveDate, NaiveTime};
use rusqlite::params;

use super::*;

/// Field set for inserting a planned slot. The effective schedule is already
/// resolved by the planner; the store only enforces uniqueness.
pub struct NewPlannedSlot {
    pub day_id: i64,
    pub shift_type_id: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: f64,
    pub uses_override: bool,
    pub override_reason: Option<String>,
    pub planned_headcount: i32,
    pub planned_visitors: i32,
}

impl RosterDb {
    // =========================================================================
    // Planned slots
    // =========================================================================

    /// Insert a planned slot. A second insert for the same (day, shift type)
    /// violates the UNIQUE constraint; the caller maps that to `DuplicateSlot`
    /// and the first record stays untouched.
    pub fn insert_planned_slot(&self, slot: &NewPlannedSlot) -> Result<DbPlannedSlot, DbError> {
        self.conn.execute(
            "INSERT INTO planned_slots
                (day_id, shift_type_id, start_time, end_time, duration_hours,
                 uses_override, override_reason, planned_headcount, planned_visitors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                slot.day_id,
                slot.shift_type_id,
                time_to_sql(slot.start_time),
                time_to_sql(slot.end_time),
                slot.duration_hours,
                slot.uses_override as i32,
                slot.override_reason,
                slot.planned_headcount,
                slot.planned_visitors,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_planned_slot(id)?
            .ok_or_else(|| DbError::CorruptRow(format!("slot {} missing after insert", id)))
    }

    /// Explicit mutation path for an existing slot: schedule override and
    /// headcounts. Who/when the slot is for never changes.
    pub fn update_planned_slot(
        &self,
        id: i64,
        start_time: NaiveTime,
        end_time: NaiveTime,
        duration_hours: f64,
        uses_override: bool,
        override_reason: Option<&str>,
        planned_headcount: i32,
        planned_visitors: i32,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE planned_slots SET
                start_time = ?2, end_time = ?3, duration_hours = ?4,
                uses_override = ?5, override_reason = ?6,
                planned_headcount = ?7, planned_visitors = ?8
             WHERE id = ?1",
            params![
                id,
                time_to_sql(start_time),
                time_to_sql(end_time),
                duration_hours,
                uses_override as i32,
                override_reason,
                planned_headcount,
                planned_visitors,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_planned_slot(&self, id: i64) -> Result<Option<DbPlannedSlot>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, day_id, shift_type_id, start_time, end_time, duration_hours,
                    uses_override, override_reason, planned_headcount, planned_visitors
             FROM planned_slots WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_slot_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_slot_for(
        &self,
        day_id: i64,
        shift_type_id: i64,
    ) -> Result<Option<DbPlannedSlot>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, day_id, shift_type_id, start_time, end_time, duration_hours,
                    uses_override, override_reason, planned_headcount, planned_visitors
             FROM planned_slots WHERE day_id = ?1 AND shift_type_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![day_id, shift_type_id], Self::map_slot_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Slots whose day falls in [start, end), ordered by date then shift type.
    pub fn list_slots_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DbPlannedSlot>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT ps.id, ps.day_id, ps.shift_type_id, ps.start_time, ps.end_time,
                    ps.duration_hours, ps.uses_override, ps.override_reason,
                    ps.planned_headcount, ps.planned_visitors
             FROM planned_slots ps
             JOIN days d ON d.id = ps.day_id
             WHERE d.date >= ?1 AND d.date < ?2
             ORDER BY d.date, ps.shift_type_id",
        )?;
        let rows = stmt.query_map(params![date_to_sql(start), date_to_sql(end)], Self::map_slot_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn map_slot_row(row: &rusqlite::Row) -> rusqlite::Result<DbPlannedSlot> {
        Ok(DbPlannedSlot {
            id: row.get(0)?,
            day_id: row.get(1)?,
            shift_type_id: row.get(2)?,
            start_time: time_col(row, 3)?,
            end_time: time_col(row, 4)?,
            duration_hours: row.get(5)?,
            uses_override: row.get::<_, i32>(6)? != 0,
            override_reason: row.get(7)?,
            planned_headcount: row.get(8)?,
            planned_visitors: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn slot(day_id: i64, shift_type_id: i64) -> NewPlannedSlot {
        NewPlannedSlot {
            day_id,
            shift_type_id,
            start_time: NaiveTime::from_hms_opt(8, 45, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 15, 0).unwrap(),
            duration_hours: 2.5,
            uses_override: false,
            override_reason: None,
            planned_headcount: 4,
            planned_visitors: 0,
        }
    }

    #[test]
    fn test_duplicate_slot_is_constraint_violation() {
        let db = RosterDb::open_in_memory().unwrap();
        let day = db
            .seed_day(NaiveDate::from_ymd_opt(2025, 12, 16).unwrap(), false, None)
            .unwrap();
        let st = db
            .upsert_shift_type("morning", None, None, None, None, false)
            .unwrap();

        let first = db.insert_planned_slot(&slot(day.id, st.id)).unwrap();
        let err = db.insert_planned_slot(&slot(day.id, st.id)).unwrap_err();
        assert!(err.is_unique_violation());

        // First record unchanged
        let kept = db.get_planned_slot(first.id).unwrap().unwrap();
        assert_eq!(kept.duration_hours, 2.5);
        assert_eq!(kept.planned_headcount, 4);
    }
}
