//! Per-batch reference maps.
//!
//! The edit surface speaks natural keys (dates, shift-type names, national
//! IDs); the store speaks surrogate ids. Rather than a lookup query per
//! row, each reconciliation batch loads the referenced tables once —
//! complete, paginated reads — and resolves every row against these maps
//! in O(1).

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use super::backend::StoreBackend;
use super::parse;
use crate::postgrest::rows::ShiftTypeRow;
use crate::RosterError;

#[derive(Default)]
pub struct RefMaps {
    /// date -> day id
    pub days: HashMap<NaiveDate, i64>,
    /// shift-type name -> full catalog row (the planner needs the defaults,
    /// not just the id)
    pub shift_types: HashMap<String, ShiftTypeRow>,
    /// normalized dni -> person id
    pub people: HashMap<String, i64>,
    /// (day id, shift type id) -> slot id
    pub slots: HashMap<(i64, i64), i64>,
    /// (person id, date) -> shift type ids already held (non-cancelled).
    /// Feeds the soft double-shift warning.
    pub occupancy: HashMap<(i64, NaiveDate), HashSet<i64>>,
    /// slot id -> shift type id, for occupancy bookkeeping
    slot_shift_types: HashMap<i64, i64>,
}

impl RefMaps {
    /// Load whatever the maps need from the store. `with_assignments`
    /// additionally loads current occupancy (only assignment batches pay
    /// for it).
    pub async fn load(
        backend: &dyn StoreBackend,
        with_slots: bool,
        with_assignments: bool,
    ) -> Result<Self, RosterError> {
        let mut maps = RefMaps::default();

        for day in backend.list_days().await? {
            if let Some(id) = day.id {
                maps.days.insert(day.date, id);
            }
        }
        for st in backend.list_shift_types().await? {
            maps.shift_types.insert(st.name.clone(), st);
        }
        for person in backend.list_people().await? {
            if let Some(id) = person.id {
                maps.people.insert(parse::normalize_dni(&person.dni), id);
            }
        }

        if with_slots || with_assignments {
            for slot in backend.list_slots().await? {
                if let Some(id) = slot.id {
                    maps.slots.insert((slot.day_id, slot.shift_type_id), id);
                    maps.slot_shift_types.insert(id, slot.shift_type_id);
                }
            }
        }

        if with_assignments {
            for a in backend.list_assignments().await? {
                if a.state == "cancelled" {
                    continue;
                }
                let shift_type = maps.slot_shift_types.get(&a.slot_id).copied().unwrap_or(-1);
                maps.occupancy
                    .entry((a.person_id, a.date))
                    .or_default()
                    .insert(shift_type);
            }
        }

        log::info!(
            "reference maps loaded: {} days, {} shift types, {} people, {} slots",
            maps.days.len(),
            maps.shift_types.len(),
            maps.people.len(),
            maps.slots.len()
        );
        Ok(maps)
    }

    pub fn resolve_day(&self, date: NaiveDate) -> Option<i64> {
        self.days.get(&date).copied()
    }

    pub fn resolve_shift_type(&self, name: &str) -> Option<&ShiftTypeRow> {
        self.shift_types.get(name.trim())
    }

    /// Resolve a person from a selector label or bare national ID.
    pub fn resolve_person(&self, cell: &str) -> Option<i64> {
        self.people.get(&parse::dni_from_selector(cell)).copied()
    }

    pub fn resolve_slot(&self, day_id: i64, shift_type_id: i64) -> Option<i64> {
        self.slots.get(&(day_id, shift_type_id)).copied()
    }

    /// True if the person already holds a different shift that date,
    /// counting both store state and rows seen earlier in this batch.
    pub fn is_double_shift(&self, person_id: i64, date: NaiveDate, shift_type_id: i64) -> bool {
        self.occupancy
            .get(&(person_id, date))
            .map(|held| held.iter().any(|&st| st != shift_type_id))
            .unwrap_or(false)
    }

    /// Record a row accepted during this batch so later rows see it.
    pub fn note_occupancy(&mut self, person_id: i64, date: NaiveDate, shift_type_id: i64) {
        self.occupancy
            .entry((person_id, date))
            .or_default()
            .insert(shift_type_id);
    }
}
