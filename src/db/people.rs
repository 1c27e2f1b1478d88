use rusqlite::params;

use super::*;

impl RosterDb {
    // =========================================================================
    // People (master data, mirrored from the external personnel service)
    // =========================================================================

    /// Insert or update a person, keyed by national ID. Returns the stored row.
    pub fn upsert_person(
        &self,
        dni: &str,
        last_name: &str,
        first_name: &str,
        cohort: Option<i32>,
        email: Option<&str>,
    ) -> Result<DbPerson, DbError> {
        self.conn.execute(
            "INSERT INTO people (dni, last_name, first_name, cohort, email, active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(dni) DO UPDATE SET
                last_name = excluded.last_name,
                first_name = excluded.first_name,
                cohort = COALESCE(excluded.cohort, people.cohort),
                email = COALESCE(excluded.email, people.email)",
            params![dni, last_name, first_name, cohort, email],
        )?;
        self.get_person_by_dni(dni)?
            .ok_or_else(|| DbError::CorruptRow(format!("person '{}' missing after upsert", dni)))
    }

    pub fn get_person(&self, id: i64) -> Result<Option<DbPerson>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, dni, last_name, first_name, cohort, email, active
             FROM people WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_person_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up a person by national ID (dots and spaces already stripped by
    /// the caller).
    pub fn get_person_by_dni(&self, dni: &str) -> Result<Option<DbPerson>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, dni, last_name, first_name, cohort, email, active
             FROM people WHERE dni = ?1",
        )?;
        let mut rows = stmt.query_map(params![dni], Self::map_person_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_people(&self, active_only: bool) -> Result<Vec<DbPerson>, DbError> {
        let sql = if active_only {
            "SELECT id, dni, last_name, first_name, cohort, email, active
             FROM people WHERE active = 1 ORDER BY last_name, first_name"
        } else {
            "SELECT id, dni, last_name, first_name, cohort, email, active
             FROM people ORDER BY last_name, first_name"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::map_person_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn map_person_row(row: &rusqlite::Row) -> rusqlite::Result<DbPerson> {
        Ok(DbPerson {
            id: row.get(0)?,
            dni: row.get(1)?,
            last_name: row.get(2)?,
            first_name: row.get(3)?,
            cohort: row.get(4)?,
            email: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
        })
    }
}
