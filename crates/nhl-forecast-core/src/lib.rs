#![forbid(unsafe_code)]
//! Prediction lifecycle core for the NHL forecasting workflow.
//!
//! Raw agent output flows through this crate in a fixed order:
//! - [`projection`] turns projection-agent output into the current projection set.
//! - [`reconcile`] turns results-agent output into a dated [`ledger::HistoryEntry`].
//! - [`ledger`] persists entries and derives the flattened history views.
//! - [`accuracy`] exposes the per-entry accuracy snapshot.
//! - [`pattern`] validates pattern-agent output computed over the whole ledger.
//!
//! Every agent and store boundary goes through [`lenient`], so malformed
//! payloads degrade to empty values instead of errors.

pub mod accuracy;
pub mod flag;
pub mod ledger;
pub mod lenient;
pub mod pattern;
pub mod projection;
pub mod reconcile;
pub mod sample;
pub mod store;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

pub use accuracy::{AccuracyData, CalibrationBucket, CalibrationEntry, Kpi, KpiTier};
pub use flag::{classify, FlagCategory};
pub use ledger::{FlatRow, HistoryEntry, HistoryFilter, HistoryLedger, LedgerMetrics, RowKind};
pub use pattern::{pattern_instruction, AntiPattern, Pattern, PatternAnalysis, PatternSummary};
pub use projection::{
    projection_instruction, GameProjection, PlayerProjection, PlayerQuery, PlayerSort,
    ProjectionBuild, ProjectionMeta, ProjectionSet,
};
pub use reconcile::{
    history_record, reconciliation_instruction, FlagOutcome, GameResult, Insight, PlayerResult,
    ReconciliationReport, ResultsMeta,
};
pub use store::{KeyValueStore, MemoryKvStore, StoreError, HISTORY_KEY, PROJECTIONS_KEY};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ForecastError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("format error: {0}")]
    Format(String),
}

/// Parses a `YYYY-MM-DD` reconciliation date.
///
/// History filtering compares dates as strings, so only the sortable ISO
/// calendar form is accepted.
///
/// # Errors
/// Returns [`ForecastError::Validation`] for empty or non-ISO input.
pub fn parse_iso_date(value: &str) -> Result<Date, ForecastError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ForecastError::Validation(
            "date MUST be provided".to_string(),
        ));
    }

    Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
        .map_err(|err| ForecastError::Validation(format!("date MUST be YYYY-MM-DD: {err}")))
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ForecastError::Format`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ForecastError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| ForecastError::Format(format!("failed to format RFC3339 timestamp: {err}")))
}

/// Formats a date the way the projection instruction spells it out,
/// e.g. `Friday, February 27, 2026`.
///
/// # Errors
/// Returns [`ForecastError::Format`] when formatting fails.
pub fn format_long_date(value: Date) -> Result<String, ForecastError> {
    value
        .format(format_description!(
            "[weekday], [month repr:long] [day padding:none], [year]"
        ))
        .map_err(|err| ForecastError::Format(format!("failed to format date: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Calendar date on the local clock. Falls back to UTC when the local
/// offset cannot be determined.
#[must_use]
pub fn today_local() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn iso_date_accepts_calendar_form() {
        let date = must(parse_iso_date("2026-02-27"));
        assert_eq!(date.year(), 2026);
        assert_eq!(u8::from(date.month()), 2);
        assert_eq!(date.day(), 27);
    }

    #[test]
    fn iso_date_rejects_empty_and_locale_forms() {
        assert!(parse_iso_date("   ").is_err());
        assert!(parse_iso_date("02/27/2026").is_err());
        assert!(parse_iso_date("2026-2-27").is_err());
    }

    #[test]
    fn long_date_spells_weekday_and_month() {
        let date = must(parse_iso_date("2026-02-27"));
        assert_eq!(must(format_long_date(date)), "Friday, February 27, 2026");
    }

    #[test]
    fn rfc3339_is_utc() {
        let formatted = must(format_rfc3339(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(formatted, "1970-01-01T00:00:00Z");
    }
}
