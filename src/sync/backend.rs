//! Store access seam for the reconciler.
//!
//! The reconciler needs complete table reads (for its per-batch reference
//! maps) and natural-key upserts. Both go through this trait so tests can
//! run against an in-memory store; the HTTP client implements it with
//! paginated reads and `on_conflict` upserts.

use async_trait::async_trait;

use crate::postgrest::rows::{AssignmentRow, DayRow, PersonRow, PlannedSlotRow, ShiftTypeRow};
use crate::postgrest::StoreClient;
use crate::RosterError;

#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn list_days(&self) -> Result<Vec<DayRow>, RosterError>;
    async fn list_shift_types(&self) -> Result<Vec<ShiftTypeRow>, RosterError>;
    async fn list_people(&self) -> Result<Vec<PersonRow>, RosterError>;
    async fn list_slots(&self) -> Result<Vec<PlannedSlotRow>, RosterError>;
    async fn list_assignments(&self) -> Result<Vec<AssignmentRow>, RosterError>;

    async fn upsert_day(&self, row: &DayRow) -> Result<(), RosterError>;
    async fn upsert_shift_type(&self, row: &ShiftTypeRow) -> Result<(), RosterError>;
    async fn upsert_person(&self, row: &PersonRow) -> Result<(), RosterError>;
    async fn upsert_slot(&self, row: &PlannedSlotRow) -> Result<(), RosterError>;
    async fn upsert_assignment(&self, row: &AssignmentRow) -> Result<(), RosterError>;
}

#[async_trait]
impl StoreBackend for StoreClient {
    async fn list_days(&self) -> Result<Vec<DayRow>, RosterError> {
        Ok(self.fetch_all("days", &[]).await?)
    }

    async fn list_shift_types(&self) -> Result<Vec<ShiftTypeRow>, RosterError> {
        Ok(self.fetch_all("shift_types", &[]).await?)
    }

    async fn list_people(&self) -> Result<Vec<PersonRow>, RosterError> {
        Ok(self.fetch_all("people", &[]).await?)
    }

    async fn list_slots(&self) -> Result<Vec<PlannedSlotRow>, RosterError> {
        Ok(self.fetch_all("planned_slots", &[]).await?)
    }

    async fn list_assignments(&self) -> Result<Vec<AssignmentRow>, RosterError> {
        Ok(self.fetch_all("assignments", &[]).await?)
    }

    async fn upsert_day(&self, row: &DayRow) -> Result<(), RosterError> {
        Ok(self.upsert("days", "date", row).await?)
    }

    async fn upsert_shift_type(&self, row: &ShiftTypeRow) -> Result<(), RosterError> {
        Ok(self.upsert("shift_types", "name", row).await?)
    }

    async fn upsert_person(&self, row: &PersonRow) -> Result<(), RosterError> {
        Ok(self.upsert("people", "dni", row).await?)
    }

    async fn upsert_slot(&self, row: &PlannedSlotRow) -> Result<(), RosterError> {
        Ok(self.upsert("planned_slots", "day_id,shift_type_id", row).await?)
    }

    async fn upsert_assignment(&self, row: &AssignmentRow) -> Result<(), RosterError> {
        Ok(self
            .upsert("assignments", "person_id,slot_id,date", row)
            .await?)
    }
}
