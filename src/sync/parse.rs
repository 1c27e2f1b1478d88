//! Cell parsing for the tabular edit surface.
//!
//! Operators type dates and times by hand, so several layouts are accepted:
//! ISO and day-first dates, times with or without seconds. Anything else is
//! a row-level error naming the field, never a silent default.

use chrono::{NaiveDate, NaiveTime};

/// Parse a date cell: `YYYY-MM-DD` or day-first `DD/MM/YYYY`. A trailing
/// time component (spreadsheets love those) is ignored.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let date_part = cell.trim().split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}

/// Parse a time cell: `HH:MM:SS` or `HH:MM`.
pub fn parse_time(cell: &str) -> Option<NaiveTime> {
    let t = cell.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .ok()
}

/// Normalize a national ID: strip thousands dots and spaces.
pub fn normalize_dni(cell: &str) -> String {
    cell.trim().replace(['.', ' '], "")
}

/// Extract the national ID from a person selector cell. The edit surface
/// offers labels like `"García, Ana (2025) | 30.123.456"`; operators may
/// also paste a bare ID.
pub fn dni_from_selector(cell: &str) -> String {
    let tail = cell.rsplit('|').next().unwrap_or(cell);
    normalize_dni(tail)
}

/// Parse a boolean cell: `1/0`, `true/false`, `yes/no`, `si/no` (any case).
pub fn parse_flag(cell: &str) -> Option<bool> {
    match cell.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "si" | "sí" | "x" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}
