//! History Ledger.
//!
//! An append-only list of reconciled entries persisted under [`HISTORY_KEY`].
//! Entries keep insertion order; nothing is mutated or removed except by a
//! full [`HistoryLedger::clear`]. Views over the ledger work on flattened rows.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accuracy::{format_rate, AccuracyData};
use crate::lenient;
use crate::reconcile::{FlagOutcome, GameResult, PlayerResult};
use crate::store::{read_json, KeyValueStore, HISTORY_KEY};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// ISO `YYYY-MM-DD`. Filtering compares this as a string.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::record_list")]
    pub game_results: Vec<GameResult>,
    #[serde(default, deserialize_with = "lenient::record_list")]
    pub player_results: Vec<PlayerResult>,
    #[serde(default, deserialize_with = "lenient::opt_record", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyData>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Game,
    Player,
}

impl RowKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::Player => "player",
        }
    }
}

/// Uniform row shape shared by game and player results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatRow {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub name: String,
    pub team: String,
    pub projected: String,
    pub actual: String,
    pub flags: Vec<String>,
    pub hit: bool,
}

impl FlatRow {
    fn from_game(date: &str, result: &GameResult) -> Self {
        Self {
            date: date.to_string(),
            kind: RowKind::Game,
            name: placeholder(result.game.as_deref()),
            team: "-".to_string(),
            projected: format!("Total: {}", fixed_one(result.projected_total)),
            actual: format!("Total: {}", plain(result.actual_total)),
            flags: result.flags_projected.clone(),
            hit: result.is_hit(),
        }
    }

    fn from_player(date: &str, result: &PlayerResult) -> Self {
        Self {
            date: date.to_string(),
            kind: RowKind::Player,
            name: placeholder(result.player.as_deref()),
            team: placeholder(result.team.as_deref()),
            projected: format!(
                "SOG: {} / PTS: {}",
                fixed_one(result.projected_sog),
                fixed_one(result.projected_pts)
            ),
            actual: format!("SOG: {} / PTS: {}", plain(result.actual_sog), plain(result.actual_pts)),
            flags: result.flags_projected.clone(),
            hit: result.is_hit(),
        }
    }
}

fn placeholder(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

// Same output as JavaScript `toFixed(1)`. Exact ties (x.25, x.75) round
// away from zero; `{:.1}` alone rounds them to even.
#[allow(clippy::float_cmp)]
fn fixed_one(value: Option<f64>) -> String {
    value.map_or_else(
        || "-".to_string(),
        |number| {
            let quarters = number.abs() * 4.0;
            let number = if quarters.fract() == 0.0 && quarters % 2.0 == 1.0 {
                (number.abs() * 10.0).ceil().copysign(number) / 10.0
            } else if number == 0.0 {
                0.0
            } else {
                number
            };
            format!("{number:.1}")
        },
    )
}

// Whole numbers render without a fractional part.
fn plain(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |number| format!("{number}"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryLedger {
    pub entries: Vec<HistoryEntry>,
}

impl HistoryLedger {
    #[must_use]
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    /// Reads the persisted ledger. Absent, corrupt or non-array values yield
    /// an empty ledger.
    #[must_use]
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match read_json(store, HISTORY_KEY, Value::Array(Vec::new())) {
            Value::Array(items) => Self {
                entries: items.iter().map(lenient::decode).collect(),
            },
            _ => Self::default(),
        }
    }

    /// Appends `entry` to the store and to the in-memory ledger. The entry is
    /// kept in memory even when the store write fails; the return value says
    /// whether it was persisted.
    pub fn append(&mut self, store: &mut dyn KeyValueStore, entry: HistoryEntry) -> bool {
        match serde_json::to_value(&entry) {
            Ok(record) => self.append_record(store, record),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode history entry");
                self.entries.push(entry);
                false
            }
        }
    }

    /// Appends a raw ledger record as-is. The in-memory ledger gains its
    /// lenient decode, so the stored record may carry fields the typed entry
    /// drops.
    pub fn append_record(&mut self, store: &mut dyn KeyValueStore, record: Value) -> bool {
        let entry: HistoryEntry = lenient::decode(&record);
        let persisted = match store.append_to_array(HISTORY_KEY, &record) {
            Ok(stored_len) => {
                tracing::info!(stored_len, date = ?entry.date, "history entry appended");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "history append failed; entry kept in memory only");
                false
            }
        };
        self.entries.push(entry);
        persisted
    }

    /// Deletes the persisted ledger and empties the in-memory one.
    pub fn clear(&mut self, store: &mut dyn KeyValueStore) -> bool {
        self.entries.clear();
        match store.remove(HISTORY_KEY) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "history clear failed in store");
                false
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every game result followed by every player result, entry by entry.
    #[must_use]
    pub fn flatten(&self) -> Vec<FlatRow> {
        let mut rows = Vec::new();
        for entry in &self.entries {
            let date = entry.date.as_deref().unwrap_or_default();
            rows.extend(entry.game_results.iter().map(|result| FlatRow::from_game(date, result)));
            rows.extend(
                entry
                    .player_results
                    .iter()
                    .map(|result| FlatRow::from_player(date, result)),
            );
        }
        rows
    }

    /// The ledger as a JSON array, the same shape the store holds.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}

/// Row filter. Empty strings are treated like absent bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistoryFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

impl HistoryFilter {
    #[must_use]
    pub fn matches(&self, row: &FlatRow) -> bool {
        if let Some(from) = non_empty(self.date_from.as_deref()) {
            if row.date.as_str() < from {
                return false;
            }
        }
        if let Some(to) = non_empty(self.date_to.as_deref()) {
            if row.date.as_str() > to {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => {
                let needle = text.to_lowercase();
                row.name.to_lowercase().contains(&needle) || row.team.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }

    #[must_use]
    pub fn apply(&self, rows: &[FlatRow]) -> Vec<FlatRow> {
        rows.iter().filter(|row| self.matches(row)).cloned().collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}

/// Counts over a (usually filtered) row set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LedgerMetrics {
    pub total: usize,
    pub hits: usize,
    pub distinct_dates: usize,
    /// Rows without projected flags. They count in `total` and are never hits.
    pub unflagged: usize,
}

impl LedgerMetrics {
    #[must_use]
    pub fn from_rows(rows: &[FlatRow]) -> Self {
        let dates: BTreeSet<&str> = rows.iter().map(|row| row.date.as_str()).collect();
        Self {
            total: rows.len(),
            hits: rows.iter().filter(|row| row.hit).count(),
            distinct_dates: dates.len(),
            unflagged: rows.iter().filter(|row| row.flags.is_empty()).count(),
        }
    }

    /// `hits / total`, or `None` for an empty row set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }

    #[must_use]
    pub fn hit_rate_display(&self) -> String {
        format_rate(self.hit_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn fixed_one_rounds_ties_away_from_zero() {
        let cases = [
            (4.25, "4.3"),
            (0.25, "0.3"),
            (-4.25, "-4.3"),
            (2.75, "2.8"),
            (0.35, "0.3"),
            (5.26, "5.3"),
            (5.0, "5.0"),
            (-0.0, "0.0"),
        ];
        for (value, expected) in cases {
            assert_eq!(fixed_one(Some(value)), expected, "value {value}");
        }
        assert_eq!(fixed_one(None), "-");
    }

    #[test]
    fn append_record_stores_unmodelled_fields() {
        let mut store = MemoryKvStore::new();
        let mut ledger = HistoryLedger::default();
        let record = json!({
            "date": "2026-02-27",
            "game_results": [{"game": "A@B", "actual_away_sog": 31, "flags_projected": ["SURE2"], "flags_hit": ["SURE2"]}],
            "player_results": []
        });
        assert!(ledger.append_record(&mut store, record.clone()));

        assert_eq!(read_json(&store, HISTORY_KEY, json!([])), json!([record]));
        assert_eq!(ledger.entries[0].game_results[0].game.as_deref(), Some("A@B"));
        assert_eq!(HistoryLedger::load(&store), ledger);
    }

    fn two_day_ledger() -> HistoryLedger {
        let entries = json!([
            {
                "date": "2026-02-27",
                "game_results": [
                    {"game": "CGY@PIT", "projected_total": 5.3, "actual_total": 5, "flags_projected": ["SURE2"], "flags_hit": ["SURE2"], "flags_missed": []},
                    {"game": "CBJ@COL", "projected_total": 5.7, "actual_total": 7, "flags_projected": ["O1.5_100", "3G+"], "flags_hit": ["O1.5_100"], "flags_missed": ["3G+"]}
                ],
                "player_results": [
                    {"player": "N. MacKinnon", "team": "COL", "projected_sog": 4.2, "actual_sog": 5, "projected_pts": 1.4, "actual_pts": 2, "flags_projected": ["SURE2"], "flags_hit": ["SURE2"], "flags_missed": []},
                    {"player": "S. Crosby", "team": "PIT", "projected_sog": 3.1, "actual_sog": 2, "projected_pts": 1.1, "actual_pts": 1, "flags_projected": ["SURE2"], "flags_hit": ["SURE2"], "flags_missed": []}
                ],
                "accuracy": {"overall_hit_rate": 0.75}
            },
            {
                "date": "2026-02-26",
                "game_results": [
                    {"game": "NYR@BOS", "projected_total": 5.0, "actual_total": 4, "flags_projected": ["U1.5_100"], "flags_hit": ["U1.5_100"], "flags_missed": []}
                ],
                "player_results": [
                    {"player": "A. Panarin", "team": "NYR", "projected_sog": 3.5, "actual_sog": 4, "projected_pts": 1.0, "actual_pts": 0, "flags_projected": ["UNDER_RISK"], "flags_hit": [], "flags_missed": ["UNDER_RISK"]}
                ],
                "accuracy": {"overall_hit_rate": 0.60}
            }
        ]);
        let mut store = MemoryKvStore::new();
        must(store.set(HISTORY_KEY, &entries.to_string()));
        HistoryLedger::load(&store)
    }

    fn row(date: &str, name: &str, hit: bool) -> FlatRow {
        FlatRow {
            date: date.to_string(),
            kind: RowKind::Player,
            name: name.to_string(),
            team: "-".to_string(),
            projected: String::new(),
            actual: String::new(),
            flags: Vec::new(),
            hit,
        }
    }

    #[test]
    fn two_day_ledger_metrics() {
        let rows = two_day_ledger().flatten();
        let metrics = LedgerMetrics::from_rows(&rows);
        assert_eq!(metrics.total, 6);
        assert_eq!(metrics.hits, 4);
        assert_eq!(metrics.distinct_dates, 2);
        assert_eq!(metrics.hit_rate_display(), "67%");
    }

    #[test]
    fn flatten_renders_rows_in_entry_order() {
        let rows = two_day_ledger().flatten();
        assert_eq!(rows[0].kind, RowKind::Game);
        assert_eq!(rows[0].projected, "Total: 5.3");
        assert_eq!(rows[0].actual, "Total: 5");
        assert_eq!(rows[0].team, "-");
        assert_eq!(rows[2].projected, "SOG: 4.2 / PTS: 1.4");
        assert_eq!(rows[2].actual, "SOG: 5 / PTS: 2");
        assert_eq!(rows[5].name, "A. Panarin");
        assert!(!rows[5].hit);
        assert_eq!(rows[4].projected, "Total: 5.0");
    }

    #[test]
    fn missing_values_render_placeholders() {
        let ledger = HistoryLedger::new(vec![HistoryEntry {
            date: Some("2026-03-01".to_string()),
            game_results: vec![GameResult::default()],
            player_results: vec![PlayerResult::default()],
            accuracy: None,
        }]);
        let rows = ledger.flatten();
        assert_eq!(rows[0].name, "-");
        assert_eq!(rows[0].projected, "Total: -");
        assert_eq!(rows[1].team, "-");
        assert_eq!(rows[1].actual, "SOG: - / PTS: -");
    }

    #[test]
    fn filter_by_date_bounds_and_search() {
        let rows = two_day_ledger().flatten();

        let day = HistoryFilter {
            date_from: Some("2026-02-26".to_string()),
            date_to: Some("2026-02-26".to_string()),
            search: None,
        };
        assert_eq!(day.apply(&rows).len(), 2);

        let search = HistoryFilter {
            search: Some("  pit ".to_string()),
            ..HistoryFilter::default()
        };
        let matched = search.apply(&rows);
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|row| row.date == "2026-02-27"));

        let blank = HistoryFilter {
            date_from: Some(String::new()),
            search: Some("   ".to_string()),
            ..HistoryFilter::default()
        };
        assert_eq!(blank.apply(&rows).len(), rows.len());
    }

    #[test]
    fn empty_row_set_renders_unavailable_rate() {
        let metrics = LedgerMetrics::from_rows(&[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.hit_rate(), None);
        assert_eq!(metrics.hit_rate_display(), "--");
    }

    #[test]
    fn unflagged_rows_count_in_total_but_never_hit() {
        let ledger = HistoryLedger::new(vec![HistoryEntry {
            date: Some("2026-03-01".to_string()),
            game_results: vec![GameResult::default()],
            ..HistoryEntry::default()
        }]);
        let metrics = LedgerMetrics::from_rows(&ledger.flatten());
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.unflagged, 1);
    }

    #[test]
    fn non_array_store_value_loads_empty() {
        let mut store = MemoryKvStore::new();
        must(store.set(HISTORY_KEY, r#"{"date":"2026-02-27"}"#));
        assert!(HistoryLedger::load(&store).is_empty());
        must(store.set(HISTORY_KEY, "not json"));
        assert!(HistoryLedger::load(&store).is_empty());
    }

    #[test]
    fn append_then_reload_matches_memory() {
        let mut store = MemoryKvStore::new();
        let mut ledger = HistoryLedger::load(&store);
        assert!(ledger.append(
            &mut store,
            HistoryEntry {
                date: Some("2026-02-27".to_string()),
                ..HistoryEntry::default()
            }
        ));
        assert_eq!(HistoryLedger::load(&store), ledger);
    }

    #[test]
    fn append_failure_keeps_entry_in_memory() {
        let mut store = MemoryKvStore::with_max_value_bytes(4);
        let mut ledger = HistoryLedger::default();
        let persisted = ledger.append(
            &mut store,
            HistoryEntry {
                date: Some("2026-02-27".to_string()),
                ..HistoryEntry::default()
            },
        );
        assert!(!persisted);
        assert_eq!(ledger.len(), 1);
        assert_eq!(must(store.get(HISTORY_KEY)), None);
    }

    #[test]
    fn clear_removes_store_key() {
        let mut store = MemoryKvStore::new();
        let mut ledger = HistoryLedger::default();
        ledger.append(&mut store, HistoryEntry::default());
        assert!(ledger.clear(&mut store));
        assert!(ledger.is_empty());
        assert_eq!(must(store.get(HISTORY_KEY)), None);
    }

    proptest! {
        #[test]
        fn append_grows_ledger_by_exactly_one(dates in proptest::collection::vec("20[0-9]{2}-[01][0-9]-[0-3][0-9]", 0..12)) {
            let mut store = MemoryKvStore::new();
            let mut ledger = HistoryLedger::default();
            for (index, date) in dates.iter().enumerate() {
                ledger.append(&mut store, HistoryEntry { date: Some(date.clone()), ..HistoryEntry::default() });
                prop_assert_eq!(ledger.len(), index + 1);
                prop_assert_eq!(HistoryLedger::load(&store).len(), index + 1);
            }
            let stored: Vec<Option<String>> = HistoryLedger::load(&store).entries.into_iter().map(|entry| entry.date).collect();
            let expected: Vec<Option<String>> = dates.into_iter().map(Some).collect();
            prop_assert_eq!(stored, expected);
        }

        #[test]
        fn equal_bounds_keep_only_that_date(
            dates in proptest::collection::vec("2026-0[1-3]-0[1-4]", 1..20),
            pick in 0usize..20,
        ) {
            let rows: Vec<FlatRow> = dates.iter().map(|date| row(date, "x", false)).collect();
            let target = dates[pick % dates.len()].clone();
            let filter = HistoryFilter {
                date_from: Some(target.clone()),
                date_to: Some(target.clone()),
                search: None,
            };
            let kept = filter.apply(&rows);
            prop_assert!(!kept.is_empty());
            prop_assert!(kept.iter().all(|row| row.date == target));
            prop_assert_eq!(kept.len(), dates.iter().filter(|date| **date == target).count());
        }

        #[test]
        fn hits_never_exceed_total(hits in proptest::collection::vec(any::<bool>(), 0..30)) {
            let rows: Vec<FlatRow> = hits.iter().map(|hit| row("2026-02-27", "x", *hit)).collect();
            let metrics = LedgerMetrics::from_rows(&rows);
            prop_assert!(metrics.hits <= metrics.total);
            prop_assert_eq!(metrics.hits, hits.iter().filter(|hit| **hit).count());
        }
    }
}
