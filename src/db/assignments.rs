use chrono::{NaiveDate, Utc};
use rusqlite::params;

use super::*;

impl RosterDb {
    // =========================================================================
    // Assignments (append-dominant ledger rows)
    // =========================================================================

    /// Insert a new assignment in `active` state. A live duplicate for the
    /// same (person, slot) violates the partial unique index; the caller
    /// maps that to `DuplicateActiveAssignment`.
    pub fn insert_assignment(
        &self,
        person_id: i64,
        slot_id: i64,
        date: NaiveDate,
        replaces_assignment_id: Option<i64>,
        change_reason: Option<&str>,
    ) -> Result<DbAssignment, DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO assignments
                (person_id, slot_id, date, state, shift_cancelled,
                 replaces_assignment_id, change_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', 0, ?4, ?5, ?6, ?6)",
            params![person_id, slot_id, date_to_sql(date), replaces_assignment_id, change_reason, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_assignment(id)?
            .ok_or_else(|| DbError::CorruptRow(format!("assignment {} missing after insert", id)))
    }

    pub fn get_assignment(&self, id: i64) -> Result<Option<DbAssignment>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, person_id, slot_id, date, state, shift_cancelled,
                    replaces_assignment_id, change_reason, created_at, updated_at
             FROM assignments WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_assignment_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Update only the lifecycle fields. Person, slot and date are immutable
    /// after creation.
    pub fn set_assignment_state(
        &self,
        id: i64,
        state: AssignmentState,
        shift_cancelled: bool,
        change_reason: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE assignments SET
                state = ?2,
                shift_cancelled = ?3,
                change_reason = COALESCE(?4, change_reason),
                updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                state.as_str(),
                shift_cancelled as i32,
                change_reason,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The replacement created for a cancelled assignment, if any
    /// (forward traversal of the cancel+relink chain).
    pub fn get_replacement_of(&self, id: i64) -> Result<Option<DbAssignment>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, person_id, slot_id, date, state, shift_cancelled,
                    replaces_assignment_id, change_reason, created_at, updated_at
             FROM assignments WHERE replaces_assignment_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_assignment_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Non-cancelled assignments a person holds on a given date. Used for
    /// the soft double-shift warning, not for blocking.
    pub fn list_live_assignments_on(
        &self,
        person_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<DbAssignment>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, person_id, slot_id, date, state, shift_cancelled,
                    replaces_assignment_id, change_reason, created_at, updated_at
             FROM assignments
             WHERE person_id = ?1 AND date = ?2 AND state != 'cancelled'",
        )?;
        let rows = stmt.query_map(params![person_id, date_to_sql(date)], Self::map_assignment_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sum of effective slot hours for a person over [start, end).
    ///
    /// Buckets by the slot's occurrence date (join through `days`), never by
    /// assignment record timestamps: a shift worked in period P but recorded
    /// later still counts toward P. Counts fulfilled and credited-absence
    /// rows, excludes anything flagged cancelled.
    pub fn fulfilled_hours_between(
        &self,
        person_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, DbError> {
        let hours: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(ps.duration_hours), 0.0)
             FROM assignments a
             JOIN planned_slots ps ON ps.id = a.slot_id
             JOIN days d ON d.id = ps.day_id
             WHERE a.person_id = ?1
               AND d.date >= ?2 AND d.date < ?3
               AND a.state IN ('fulfilled', 'absent_credited')
               AND a.shift_cancelled = 0",
            params![person_id, date_to_sql(start), date_to_sql(end)],
            |row| row.get(0),
        )?;
        Ok(hours)
    }

    fn map_assignment_row(row: &rusqlite::Row) -> rusqlite::Result<DbAssignment> {
        Ok(DbAssignment {
            id: row.get(0)?,
            person_id: row.get(1)?,
            slot_id: row.get(2)?,
            date: date_col(row, 3)?,
            state: state_col(row, 4)?,
            shift_cancelled: row.get::<_, i32>(5)? != 0,
            replaces_assignment_id: row.get(6)?,
            change_reason: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::slots::NewPlannedSlot;
    use chrono::NaiveTime;

    fn fixture(db: &RosterDb, date: NaiveDate, shift: &str, hours: f64) -> (i64, i64) {
        let day = db.seed_day(date, false, None).unwrap();
        let st = db
            .upsert_shift_type(shift, None, None, None, None, false)
            .unwrap();
        let slot = db
            .insert_planned_slot(&NewPlannedSlot {
                day_id: day.id,
                shift_type_id: st.id,
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                duration_hours: hours,
                uses_override: false,
                override_reason: None,
                planned_headcount: 1,
                planned_visitors: 0,
            })
            .unwrap();
        let person = db.upsert_person("1001", "Pérez", "Juan", None, None).unwrap();
        (person.id, slot.id)
    }

    #[test]
    fn test_live_duplicate_blocked_cancelled_not() {
        let db = RosterDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        let (person, slot) = fixture(&db, date, "morning", 2.5);

        let a = db.insert_assignment(person, slot, date, None, None).unwrap();
        let err = db.insert_assignment(person, slot, date, None, None).unwrap_err();
        assert!(err.is_unique_violation());

        // After cancellation the index no longer blocks a new row
        db.set_assignment_state(a.id, AssignmentState::Cancelled, true, Some("swap"))
            .unwrap();
        db.insert_assignment(person, slot, date, Some(a.id), Some("re-added"))
            .unwrap();
    }

    #[test]
    fn test_fk_violation_is_not_a_unique_violation() {
        let db = RosterDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        let (_, slot) = fixture(&db, date, "morning", 2.5);

        // Nonexistent person: FK failure, not a duplicate
        let err = db.insert_assignment(9999, slot, date, None, None).unwrap_err();
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_hours_sum_excludes_cancelled_and_active() {
        let db = RosterDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        let (person, slot) = fixture(&db, date, "morning", 2.5);

        let a = db.insert_assignment(person, slot, date, None, None).unwrap();
        let start = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        // Active contributes nothing
        assert_eq!(db.fulfilled_hours_between(person, start, end).unwrap(), 0.0);

        db.set_assignment_state(a.id, AssignmentState::Fulfilled, false, None)
            .unwrap();
        assert_eq!(db.fulfilled_hours_between(person, start, end).unwrap(), 2.5);

        // Fulfilled but flagged cancelled contributes zero
        db.set_assignment_state(a.id, AssignmentState::Fulfilled, true, Some("admin"))
            .unwrap();
        assert_eq!(db.fulfilled_hours_between(person, start, end).unwrap(), 0.0);
    }
}
