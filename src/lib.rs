//! Shift-roster planning, assignment and balance tracking, with
//! reconciliation against a remote row store.
//!
//! The crate is organized around five concerns:
//! - `db`: local archive (calendar, catalog, people, slots, assignments)
//! - `planner`: turning the catalog into dated planned slots
//! - `ledger`: the assignment lifecycle (cancel + relink, never mutate)
//! - `balance`: accumulated-hours computation across both stores
//! - `sync`: batch reconciliation of the tabular edit surface

pub mod balance;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
mod migrations;
pub mod planner;
pub mod postgrest;
pub mod sync;

pub use error::RosterError;
