//! Assignment ledger: binding people to planned slots through a
//! cancel-and-replace lifecycle.
//!
//! Rows are append-dominant. Cancellation is a state transition that keeps
//! the row forever; moving a person between slots cancels the old row and
//! creates a new one linked back to it, so the full history stays
//! traversable in both directions.

use crate::db::{AssignmentState, DbAssignment, RosterDb};
use crate::RosterError;

/// Result of creating an assignment: the row, plus a non-blocking warning
/// when the person already holds another live assignment that day.
#[derive(Debug)]
pub struct AssignmentOutcome {
    pub assignment: DbAssignment,
    pub double_shift_warning: Option<String>,
}

/// The two rows left behind by a relink: the cancelled original and its
/// replacement.
#[derive(Debug)]
pub struct RelinkOutcome {
    pub cancelled: DbAssignment,
    pub replacement: DbAssignment,
}

pub struct AssignmentLedger<'a> {
    db: &'a RosterDb,
}

impl<'a> AssignmentLedger<'a> {
    pub fn new(db: &'a RosterDb) -> Self {
        Self { db }
    }

    /// Assign a person to a planned slot. Starts in `active` state.
    ///
    /// A live (non-cancelled) assignment for the same (person, slot) fails
    /// with `DuplicateActiveAssignment` — enforced by the store's partial
    /// unique index, so concurrent writers cannot both succeed. A second
    /// shift on the same day is allowed but reported as a warning.
    pub fn create_assignment(
        &self,
        person_id: i64,
        slot_id: i64,
    ) -> Result<AssignmentOutcome, RosterError> {
        self.create_linked(person_id, slot_id, None, None)
    }

    fn create_linked(
        &self,
        person_id: i64,
        slot_id: i64,
        replaces: Option<i64>,
        reason: Option<&str>,
    ) -> Result<AssignmentOutcome, RosterError> {
        let slot = self
            .db
            .get_planned_slot(slot_id)?
            .ok_or_else(|| RosterError::not_found("planned slot", slot_id.to_string()))?;
        let day = self
            .db
            .get_day_by_id(slot.day_id)?
            .ok_or_else(|| RosterError::not_found("day", slot.day_id.to_string()))?;
        if self.db.get_person(person_id)?.is_none() {
            return Err(RosterError::not_found("person", person_id.to_string()));
        }

        let others = self.db.list_live_assignments_on(person_id, day.date)?;
        let double_shift_warning = if others.is_empty() {
            None
        } else {
            Some(format!(
                "person {} already holds {} shift(s) on {}",
                person_id,
                others.len(),
                day.date
            ))
        };

        let assignment = self
            .db
            .insert_assignment(person_id, slot_id, day.date, replaces, reason)
            .map_err(|e| {
                if e.is_unique_violation() {
                    RosterError::DuplicateActiveAssignment
                } else {
                    e.into()
                }
            })?;

        if let Some(warning) = &double_shift_warning {
            log::warn!("{}", warning);
        }

        Ok(AssignmentOutcome {
            assignment,
            double_shift_warning,
        })
    }

    /// `active -> fulfilled`: the slot occurred and the person attended.
    pub fn mark_fulfilled(&self, assignment_id: i64) -> Result<DbAssignment, RosterError> {
        self.transition(assignment_id, AssignmentState::Fulfilled, false, None)
    }

    /// `active -> absent_credited`: credited absence, counts for balance.
    pub fn mark_absent_credited(&self, assignment_id: i64) -> Result<DbAssignment, RosterError> {
        self.transition(assignment_id, AssignmentState::AbsentCredited, false, None)
    }

    /// Cancel an assignment. Requires a non-empty reason; sets the
    /// cancellation flag and keeps the row as an audit record.
    pub fn cancel_assignment(
        &self,
        assignment_id: i64,
        reason: &str,
    ) -> Result<DbAssignment, RosterError> {
        if reason.trim().is_empty() {
            return Err(RosterError::MissingReason("cancellation"));
        }
        self.transition(assignment_id, AssignmentState::Cancelled, true, Some(reason.trim()))
    }

    fn transition(
        &self,
        assignment_id: i64,
        next: AssignmentState,
        shift_cancelled: bool,
        reason: Option<&str>,
    ) -> Result<DbAssignment, RosterError> {
        let current = self
            .db
            .get_assignment(assignment_id)?
            .ok_or_else(|| RosterError::not_found("assignment", assignment_id.to_string()))?;
        if !current.state.can_transition_to(next) {
            return Err(RosterError::InvalidTransition {
                from: current.state.as_str(),
                to: next.as_str(),
            });
        }
        self.db
            .set_assignment_state(assignment_id, next, shift_cancelled, reason)?;
        self.db
            .get_assignment(assignment_id)?
            .ok_or_else(|| RosterError::not_found("assignment", assignment_id.to_string()))
    }

    /// Shift swap: cancel the original assignment and create a replacement
    /// on another slot, linked via `replaces_assignment_id`.
    ///
    /// Runs in one transaction so the replacement's back-reference always
    /// points at a cancellation that actually landed; a duplicate on the new
    /// slot rolls the cancellation back too.
    pub fn relink_assignment(
        &self,
        assignment_id: i64,
        new_slot_id: i64,
        reason: &str,
    ) -> Result<RelinkOutcome, RosterError> {
        if reason.trim().is_empty() {
            return Err(RosterError::MissingReason("shift change"));
        }

        self.db.with_transaction(|db| {
            let ledger = AssignmentLedger::new(db);
            let original = db
                .get_assignment(assignment_id)?
                .ok_or_else(|| RosterError::not_found("assignment", assignment_id.to_string()))?;

            let cancelled = ledger.cancel_assignment(
                assignment_id,
                &format!("moved to slot {}: {}", new_slot_id, reason.trim()),
            )?;
            let replacement = ledger
                .create_linked(
                    original.person_id,
                    new_slot_id,
                    Some(assignment_id),
                    Some(&format!("replaces assignment {}: {}", assignment_id, reason.trim())),
                )?
                .assignment;

            Ok(RelinkOutcome {
                cancelled,
                replacement,
            })
        })
    }

    /// Forward link: the replacement created for a cancelled assignment.
    pub fn replaced_by(&self, assignment_id: i64) -> Result<Option<DbAssignment>, RosterError> {
        Ok(self.db.get_replacement_of(assignment_id)?)
    }

    /// Backward link: the assignment this record replaced.
    pub fn replacement_of(&self, assignment_id: i64) -> Result<Option<DbAssignment>, RosterError> {
        let a = self
            .db
            .get_assignment(assignment_id)?
            .ok_or_else(|| RosterError::not_found("assignment", assignment_id.to_string()))?;
        match a.replaces_assignment_id {
            Some(prev) => Ok(self.db.get_assignment(prev)?),
            None => Ok(None),
        }
    }
}
