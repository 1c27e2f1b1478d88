//! Hour-balance computation per person per period.
//!
//! Balances are read-time aggregates, never maintained incrementally: the
//! ledger stays write-simple and this module pays the read cost. Each query
//! routes to whichever store is authoritative for the requested period —
//! the remote store from the cutoff year onward, the local historical
//! archive before it. Routing is a pure function of (period, cutoff); the
//! wall clock never participates.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;

use crate::db::{AssignmentState, RosterDb};
use crate::postgrest::StoreClient;
use crate::RosterError;

/// A calendar month, the balance period unit. The month is validated at
/// construction, so period bounds are always well-formed dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// # Panics
    ///
    /// `month` must be in `1..=12`.
    pub fn new(year: i32, month: u32) -> Self {
        assert!(
            (1..=12).contains(&month),
            "month {} out of range 1..=12",
            month
        );
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period (inclusive).
    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("month validated in new")
    }

    /// First day of the following period (exclusive bound).
    pub fn end(&self) -> NaiveDate {
        if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1).expect("valid year")
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1).expect("month validated in new")
        }
    }

    /// Number of periods from `from` through this one, inclusive.
    /// Zero when this period precedes `from`.
    pub fn months_since(&self, from: NaiveDate) -> u32 {
        let span = (self.year - from.year()) * 12 + self.month as i32 - from.month() as i32 + 1;
        span.max(0) as u32
    }
}

/// Which store answers a balance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Historical,
}

/// Pure routing decision: the primary store is authoritative for the cutoff
/// year and everything after it, regardless of how far in the past that is
/// relative to "now".
pub fn route_for(period: Period, cutoff_year: i32) -> Route {
    if period.year >= cutoff_year {
        Route::Primary
    } else {
        Route::Historical
    }
}

/// A store that can answer "how many countable hours did this person work
/// in [start, end)". Periods are bucketed by slot occurrence date.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn accumulated_hours(
        &self,
        person_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, RosterError>;
}

/// Historical source backed by the local SQLite archive.
pub struct HistoricalSource {
    db: Mutex<RosterDb>,
}

impl HistoricalSource {
    pub fn new(db: RosterDb) -> Self {
        Self { db: Mutex::new(db) }
    }
}

#[async_trait]
impl BalanceSource for HistoricalSource {
    async fn accumulated_hours(
        &self,
        person_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, RosterError> {
        let hours = self.db.lock().fulfilled_hours_between(person_id, start, end)?;
        Ok(hours)
    }
}

/// Primary source backed by the remote store.
pub struct PrimarySource {
    client: StoreClient,
}

impl PrimarySource {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BalanceSource for PrimarySource {
    async fn accumulated_hours(
        &self,
        person_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, RosterError> {
        let rows = self.client.fetch_balance_rows(person_id, start, end).await?;
        let hours = rows
            .iter()
            .filter(|r| {
                !r.shift_cancelled
                    && AssignmentState::parse(&r.state)
                        .map(|s| s.counts_toward_balance())
                        .unwrap_or(false)
            })
            .filter_map(|r| r.slot.as_ref().map(|s| s.duration_hours))
            .sum();
        Ok(hours)
    }
}

/// Per-person target configuration: a monthly rate accruing from the
/// cohort start date. Policy lives outside this crate; it arrives here as
/// a pure input.
#[derive(Debug, Clone, Copy)]
pub struct TargetRule {
    pub monthly_hours: f64,
    pub cohort_start: NaiveDate,
}

/// Classification of a period's accumulated hours against fixed bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceLevel {
    Low,
    Normal,
    High,
}

/// Computed balance for one (person, period).
#[derive(Debug, Clone)]
pub struct Balance {
    pub accumulated_hours: f64,
    /// `None` when the person has no target configuration — a partial
    /// result, not a failure.
    pub target_hours: Option<f64>,
    pub level: BalanceLevel,
    pub source: Route,
}

pub struct BalanceEngine {
    cutoff_year: i32,
    primary: Box<dyn BalanceSource>,
    historical: Box<dyn BalanceSource>,
    /// (low, high) month-hour bounds for level classification.
    level_bounds: (f64, f64),
}

impl BalanceEngine {
    pub fn new(
        cutoff_year: i32,
        primary: Box<dyn BalanceSource>,
        historical: Box<dyn BalanceSource>,
    ) -> Self {
        Self {
            cutoff_year,
            primary,
            historical,
            level_bounds: (60.0, 90.0),
        }
    }

    pub fn with_level_bounds(mut self, low: f64, high: f64) -> Self {
        self.level_bounds = (low, high);
        self
    }

    fn source_for(&self, period: Period) -> &dyn BalanceSource {
        match route_for(period, self.cutoff_year) {
            Route::Primary => self.primary.as_ref(),
            Route::Historical => self.historical.as_ref(),
        }
    }

    /// Compute accumulated vs target hours for one person and period.
    ///
    /// Idempotent with respect to the stores: two calls without intervening
    /// writes return identical results.
    pub async fn compute_balance(
        &self,
        person_id: i64,
        period: Period,
        target: Option<&TargetRule>,
    ) -> Result<Balance, RosterError> {
        let route = route_for(period, self.cutoff_year);
        let accumulated_hours = self
            .source_for(period)
            .accumulated_hours(person_id, period.start(), period.end())
            .await?;

        let target_hours =
            target.map(|rule| rule.monthly_hours * period.months_since(rule.cohort_start) as f64);

        let (low, high) = self.level_bounds;
        let level = if accumulated_hours < low {
            BalanceLevel::Low
        } else if accumulated_hours >= high {
            BalanceLevel::High
        } else {
            BalanceLevel::Normal
        };

        Ok(Balance {
            accumulated_hours,
            target_hours,
            level,
            source: route,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Source that records how often it was queried and returns a fixed sum.
    struct FixedSource {
        hours: f64,
        calls: AtomicU32,
    }

    impl FixedSource {
        fn new(hours: f64) -> Self {
            Self {
                hours,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl BalanceSource for FixedSource {
        async fn accumulated_hours(
            &self,
            _person_id: i64,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<f64, RosterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hours)
        }
    }

    #[test]
    fn test_routing_is_pure_function_of_cutoff() {
        // Period >= cutoff goes primary no matter how old it is by the clock
        assert_eq!(route_for(Period::new(2026, 1), 2026), Route::Primary);
        assert_eq!(route_for(Period::new(2030, 6), 2026), Route::Primary);
        assert_eq!(route_for(Period::new(2025, 12), 2026), Route::Historical);
        assert_eq!(route_for(Period::new(2019, 1), 2026), Route::Historical);
    }

    #[test]
    fn test_period_bounds_half_open() {
        let p = Period::new(2025, 12);
        assert_eq!(p.start(), NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(p.end(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_period_rejects_month_13() {
        Period::new(2026, 13);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_period_rejects_month_0() {
        Period::new(2026, 0);
    }

    #[test]
    fn test_months_since_cohort() {
        let cohort = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(Period::new(2025, 3).months_since(cohort), 1);
        assert_eq!(Period::new(2025, 12).months_since(cohort), 10);
        assert_eq!(Period::new(2026, 2).months_since(cohort), 12);
        // Period before cohort start accrues nothing
        assert_eq!(Period::new(2025, 1).months_since(cohort), 0);
    }

    #[tokio::test]
    async fn test_cutoff_routes_to_correct_source() {
        let engine = BalanceEngine::new(
            2026,
            Box::new(FixedSource::new(80.0)),
            Box::new(FixedSource::new(30.0)),
        );

        let live = engine
            .compute_balance(1, Period::new(2026, 3), None)
            .await
            .unwrap();
        assert_eq!(live.accumulated_hours, 80.0);
        assert_eq!(live.source, Route::Primary);

        let old = engine
            .compute_balance(1, Period::new(2024, 7), None)
            .await
            .unwrap();
        assert_eq!(old.accumulated_hours, 30.0);
        assert_eq!(old.source, Route::Historical);
    }

    #[tokio::test]
    async fn test_balance_idempotent_without_writes() {
        let engine = BalanceEngine::new(
            2026,
            Box::new(FixedSource::new(72.5)),
            Box::new(FixedSource::new(0.0)),
        );
        let rule = TargetRule {
            monthly_hours: 80.0,
            cohort_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        };
        let a = engine
            .compute_balance(1, Period::new(2026, 2), Some(&rule))
            .await
            .unwrap();
        let b = engine
            .compute_balance(1, Period::new(2026, 2), Some(&rule))
            .await
            .unwrap();
        assert_eq!(a.accumulated_hours, b.accumulated_hours);
        assert_eq!(a.target_hours, b.target_hours);
        assert_eq!(a.target_hours, Some(160.0));
    }

    #[tokio::test]
    async fn test_missing_target_is_partial_result() {
        let engine = BalanceEngine::new(
            2026,
            Box::new(FixedSource::new(55.0)),
            Box::new(FixedSource::new(0.0)),
        );
        let balance = engine
            .compute_balance(1, Period::new(2026, 1), None)
            .await
            .unwrap();
        assert_eq!(balance.accumulated_hours, 55.0);
        assert!(balance.target_hours.is_none());
        assert_eq!(balance.level, BalanceLevel::Low);
    }

    #[tokio::test]
    async fn test_relink_moves_hours_out_of_the_cancelled_slot() {
        use crate::ledger::AssignmentLedger;
        use crate::planner::DemandPlanner;
        use chrono::NaiveTime;

        let db = RosterDb::open_in_memory().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();
        db.seed_day(d1, false, None).unwrap();
        db.seed_day(d2, false, None).unwrap();
        db.upsert_shift_type(
            "morning",
            None,
            NaiveTime::from_hms_opt(8, 45, 0),
            NaiveTime::from_hms_opt(11, 15, 0),
            Some(2.5),
            false,
        )
        .unwrap();
        db.upsert_shift_type(
            "afternoon",
            None,
            NaiveTime::from_hms_opt(14, 0, 0),
            NaiveTime::from_hms_opt(18, 0, 0),
            Some(4.0),
            false,
        )
        .unwrap();

        let planner = DemandPlanner::new(&db);
        let morning = planner.create_planned_slot(d1, "morning", None, 1, 0).unwrap();
        assert_eq!(morning.duration_hours, 2.5);
        assert!(!morning.uses_override);
        let afternoon = planner.create_planned_slot(d2, "afternoon", None, 1, 0).unwrap();

        let person = db.upsert_person("1001", "Pérez", "Juan", None, None).unwrap();
        let ledger = AssignmentLedger::new(&db);
        let a = ledger.create_assignment(person.id, morning.id).unwrap().assignment;
        ledger.mark_fulfilled(a.id).unwrap();

        let dec = Period::new(2025, 12);
        let person_id = person.id;
        assert_eq!(
            db.fulfilled_hours_between(person_id, dec.start(), dec.end()).unwrap(),
            2.5
        );

        // Swap onto the afternoon slot: the cancelled morning row now
        // contributes zero, the fulfilled replacement contributes its 4h.
        let relinked = ledger
            .relink_assignment(a.id, afternoon.id, "swap requested")
            .unwrap();
        ledger.mark_fulfilled(relinked.replacement.id).unwrap();

        let source = HistoricalSource::new(db);
        let hours = source
            .accumulated_hours(person_id, dec.start(), dec.end())
            .await
            .unwrap();
        assert_eq!(hours, 4.0);
    }

    #[tokio::test]
    async fn test_historical_source_buckets_by_occurrence_date() {
        use crate::ledger::AssignmentLedger;
        use crate::planner::DemandPlanner;
        use chrono::NaiveTime;

        let db = RosterDb::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        db.seed_day(date, false, None).unwrap();
        db.upsert_shift_type(
            "morning",
            None,
            NaiveTime::from_hms_opt(8, 45, 0),
            NaiveTime::from_hms_opt(11, 15, 0),
            Some(2.5),
            false,
        )
        .unwrap();
        let slot = DemandPlanner::new(&db)
            .create_planned_slot(date, "morning", None, 1, 0)
            .unwrap();
        let person = db.upsert_person("1001", "Pérez", "Juan", None, None).unwrap();
        let ledger = AssignmentLedger::new(&db);
        // Recorded "today" (record timestamp is now), but occurred Nov 2024
        let a = ledger.create_assignment(person.id, slot.id).unwrap().assignment;
        ledger.mark_fulfilled(a.id).unwrap();

        let source = HistoricalSource::new(db);
        let nov = Period::new(2024, 11);
        let hours = source
            .accumulated_hours(person.id, nov.start(), nov.end())
            .await
            .unwrap();
        assert_eq!(hours, 2.5);

        // The recording month sees nothing
        let dec = Period::new(2024, 12);
        let none = source
            .accumulated_hours(person.id, dec.start(), dec.end())
            .await
            .unwrap();
        assert_eq!(none, 0.0);
    }
}
