use chrono::{Datelike, NaiveDate};
use rusqlite::params;

use super::*;

impl RosterDb {
    // =========================================================================
    // Calendar catalog: days + shift types
    // =========================================================================

    /// Look up a calendar day by date. An unknown date is an error for the
    /// caller to surface — planning against a date the calendar has never
    /// been seeded with must not silently invent a day.
    pub fn get_day(&self, date: NaiveDate) -> Result<Option<DbDay>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, date, week_of_year, weekday, is_holiday, holiday_label
             FROM days WHERE date = ?1",
        )?;
        let mut rows = stmt.query_map(params![date_to_sql(date)], Self::map_day_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_day_by_id(&self, id: i64) -> Result<Option<DbDay>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, date, week_of_year, weekday, is_holiday, holiday_label
             FROM days WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_day_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Seed a calendar day. Idempotent on date; week/weekday are derived,
    /// not caller-supplied, so a re-seed cannot disagree with the date.
    pub fn seed_day(
        &self,
        date: NaiveDate,
        is_holiday: bool,
        holiday_label: Option<&str>,
    ) -> Result<DbDay, DbError> {
        self.conn.execute(
            "INSERT INTO days (date, week_of_year, weekday, is_holiday, holiday_label)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(date) DO NOTHING",
            params![
                date_to_sql(date),
                date.iso_week().week() as i32,
                date.weekday().number_from_monday() as i32,
                is_holiday as i32,
                holiday_label,
            ],
        )?;
        self.get_day(date)?
            .ok_or_else(|| DbError::CorruptRow(format!("day {} missing after seed", date)))
    }

    /// List shift types, optionally restricted to active ones.
    /// Deactivated types stay in the catalog forever — historical slots
    /// reference them.
    pub fn list_shift_types(&self, active_only: bool) -> Result<Vec<DbShiftType>, DbError> {
        let sql = if active_only {
            "SELECT id, name, description, default_start, default_end, default_hours,
                    weekend_only, active
             FROM shift_types WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id, name, description, default_start, default_end, default_hours,
                    weekend_only, active
             FROM shift_types ORDER BY name"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::map_shift_type_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_shift_type_by_name(&self, name: &str) -> Result<Option<DbShiftType>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, default_start, default_end, default_hours,
                    weekend_only, active
             FROM shift_types WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], Self::map_shift_type_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_shift_type(&self, id: i64) -> Result<Option<DbShiftType>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, default_start, default_end, default_hours,
                    weekend_only, active
             FROM shift_types WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_shift_type_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or update a shift type, keyed by its unique name.
    pub fn upsert_shift_type(
        &self,
        name: &str,
        description: Option<&str>,
        default_start: Option<chrono::NaiveTime>,
        default_end: Option<chrono::NaiveTime>,
        default_hours: Option<f64>,
        weekend_only: bool,
    ) -> Result<DbShiftType, DbError> {
        self.conn.execute(
            "INSERT INTO shift_types
                (name, description, default_start, default_end, default_hours, weekend_only, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
             ON CONFLICT(name) DO UPDATE SET
                description = COALESCE(excluded.description, shift_types.description),
                default_start = excluded.default_start,
                default_end = excluded.default_end,
                default_hours = excluded.default_hours,
                weekend_only = excluded.weekend_only",
            params![
                name,
                description,
                default_start.map(time_to_sql),
                default_end.map(time_to_sql),
                default_hours,
                weekend_only as i32,
            ],
        )?;
        self.get_shift_type_by_name(name)?
            .ok_or_else(|| DbError::CorruptRow(format!("shift type '{}' missing after upsert", name)))
    }

    /// Shift types are never deleted, only deactivated.
    pub fn deactivate_shift_type(&self, name: &str) -> Result<bool, DbError> {
        let changed = self
            .conn
            .execute("UPDATE shift_types SET active = 0 WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    fn map_day_row(row: &rusqlite::Row) -> rusqlite::Result<DbDay> {
        Ok(DbDay {
            id: row.get(0)?,
            date: date_col(row, 1)?,
            week_of_year: row.get(2)?,
            weekday: row.get(3)?,
            is_holiday: row.get::<_, i32>(4)? != 0,
            holiday_label: row.get(5)?,
        })
    }

    fn map_shift_type_row(row: &rusqlite::Row) -> rusqlite::Result<DbShiftType> {
        Ok(DbShiftType {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            default_start: opt_time_col(row, 3)?,
            default_end: opt_time_col(row, 4)?,
            default_hours: row.get(5)?,
            weekend_only: row.get::<_, i32>(6)? != 0,
            active: row.get::<_, i32>(7)? != 0,
        })
    }
}
