//! Result Reconciler data model.
//!
//! The results agent compares a stored projection set with actuals and
//! returns per-entity flag buckets. Those buckets are trusted verbatim; the
//! flag invariants below are checked for display and tests, never enforced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::accuracy::AccuracyData;
use crate::flag::contains_flag;
use crate::ledger::HistoryEntry;
use crate::lenient::{self, array_field, object_field};

/// Projected/hit/missed flag buckets shared by game and player results.
pub trait FlagOutcome {
    fn flags_projected(&self) -> &[String];
    fn flags_hit(&self) -> &[String];
    fn flags_missed(&self) -> &[String];

    /// A record is a hit when at least one flag hit and none missed. A
    /// record without projected flags therefore never counts as a hit.
    fn is_hit(&self) -> bool {
        !self.flags_hit().is_empty() && self.flags_missed().is_empty()
    }

    fn is_unflagged(&self) -> bool {
        self.flags_projected().is_empty()
    }

    /// Reports every breach of `hit ∩ missed = ∅` and `hit, missed ⊆ projected`,
    /// comparing flags case-insensitively.
    fn flag_violations(&self) -> Vec<FlagViolation> {
        let projected = self.flags_projected();
        let missed = self.flags_missed();
        let mut violations = Vec::new();

        for flag in self.flags_hit() {
            if contains_flag(missed, flag) {
                violations.push(FlagViolation::HitAndMissed(flag.clone()));
            }
            if !contains_flag(projected, flag) {
                violations.push(FlagViolation::HitNotProjected(flag.clone()));
            }
        }
        for flag in missed {
            if !contains_flag(projected, flag) {
                violations.push(FlagViolation::MissedNotProjected(flag.clone()));
            }
        }
        violations
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", content = "flag", rename_all = "snake_case")]
pub enum FlagViolation {
    HitAndMissed(String),
    HitNotProjected(String),
    MissedNotProjected(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameResult {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub projected_total: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub actual_total: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub projected_away_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub actual_away_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub projected_home_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub actual_home_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_projected: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_hit: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_missed: Vec<String>,
}

impl GameResult {
    #[must_use]
    pub fn total_delta(&self) -> Option<f64> {
        delta(self.projected_total, self.actual_total)
    }

    #[must_use]
    pub fn away_goals_delta(&self) -> Option<f64> {
        delta(self.projected_away_goals, self.actual_away_goals)
    }

    #[must_use]
    pub fn home_goals_delta(&self) -> Option<f64> {
        delta(self.projected_home_goals, self.actual_home_goals)
    }
}

impl FlagOutcome for GameResult {
    fn flags_projected(&self) -> &[String] {
        &self.flags_projected
    }

    fn flags_hit(&self) -> &[String] {
        &self.flags_hit
    }

    fn flags_missed(&self) -> &[String] {
        &self.flags_missed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerResult {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub projected_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub actual_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub projected_pts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub actual_pts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_projected: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_hit: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags_missed: Vec<String>,
}

impl PlayerResult {
    #[must_use]
    pub fn sog_delta(&self) -> Option<f64> {
        delta(self.projected_sog, self.actual_sog)
    }

    #[must_use]
    pub fn pts_delta(&self) -> Option<f64> {
        delta(self.projected_pts, self.actual_pts)
    }
}

impl FlagOutcome for PlayerResult {
    fn flags_projected(&self) -> &[String] {
        &self.flags_projected
    }

    fn flags_hit(&self) -> &[String] {
        &self.flags_hit
    }

    fn flags_missed(&self) -> &[String] {
        &self.flags_missed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Insight {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsMeta {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub games_analyzed: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub players_analyzed: Option<u32>,
}

/// One parsed results-agent response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub game_results: Vec<GameResult>,
    pub player_results: Vec<PlayerResult>,
    pub accuracy: Option<AccuracyData>,
    pub learning_insights: Vec<Insight>,
    pub metadata: Option<ResultsMeta>,
}

impl ReconciliationReport {
    /// Parses a raw agent `result` (object or JSON string). Never fails.
    #[must_use]
    pub fn from_agent_result(raw: &Value) -> Self {
        let payload = lenient::decode_payload(raw);
        Self {
            game_results: array_field(&payload, "game_results"),
            player_results: array_field(&payload, "player_results"),
            accuracy: object_field(&payload, "accuracy"),
            learning_insights: array_field(&payload, "learning_insights"),
            metadata: object_field(&payload, "metadata"),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.game_results.is_empty() && self.player_results.is_empty() && self.accuracy.is_none()
    }

    /// The ledger entry recorded for `date`.
    #[must_use]
    pub fn to_history_entry(&self, date: &str) -> HistoryEntry {
        HistoryEntry {
            date: Some(date.to_string()),
            game_results: self.game_results.clone(),
            player_results: self.player_results.clone(),
            accuracy: self.accuracy.clone(),
        }
    }

    /// Flag invariant breaches across every record, labelled by entity name.
    #[must_use]
    pub fn flag_violations(&self) -> Vec<(String, FlagViolation)> {
        let games = self.game_results.iter().flat_map(|result| {
            let name = result.game.clone().unwrap_or_else(|| "-".to_string());
            result
                .flag_violations()
                .into_iter()
                .map(move |violation| (name.clone(), violation))
        });
        let players = self.player_results.iter().flat_map(|result| {
            let name = result.player.clone().unwrap_or_else(|| "-".to_string());
            result
                .flag_violations()
                .into_iter()
                .map(move |violation| (name.clone(), violation))
        });
        games.chain(players).collect()
    }
}

/// The ledger record appended for `date`. Result lists and accuracy are
/// copied from the agent payload verbatim, so fields [`HistoryEntry`] does
/// not model still reach the pattern agent.
#[must_use]
pub fn history_record(date: &str, raw: &Value) -> Value {
    let payload = lenient::decode_payload(raw);
    let mut record = Map::new();
    record.insert("date".to_string(), Value::String(date.to_string()));
    record.insert(
        "game_results".to_string(),
        Value::Array(array_field::<Value>(&payload, "game_results")),
    );
    record.insert(
        "player_results".to_string(),
        Value::Array(array_field::<Value>(&payload, "player_results")),
    );
    if let Some(accuracy) = payload.get("accuracy").filter(|value| value.is_object()) {
        record.insert("accuracy".to_string(), accuracy.clone());
    }
    Value::Object(record)
}

/// Instruction sent to the results agent. `stored_projections` is the
/// current projection set exactly as read from the store.
#[must_use]
pub fn reconciliation_instruction(date: &str, stored_projections: &Value) -> String {
    format!(
        "Compare projections against actual results for {date}. Here are the projections: {stored_projections}"
    )
}

fn delta(projected: Option<f64>, actual: Option<f64>) -> Option<f64> {
    Some(actual? - projected?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn game(projected: &[&str], hit: &[&str], missed: &[&str]) -> GameResult {
        let owned = |flags: &[&str]| flags.iter().map(ToString::to_string).collect::<Vec<_>>();
        GameResult {
            game: Some("CBJ@COL".to_string()),
            flags_projected: owned(projected),
            flags_hit: owned(hit),
            flags_missed: owned(missed),
            ..GameResult::default()
        }
    }

    #[test]
    fn hit_requires_a_hit_and_no_misses() {
        assert!(game(&["SURE2"], &["SURE2"], &[]).is_hit());
        assert!(!game(&["SURE2", "2G+"], &["SURE2"], &["2G+"]).is_hit());
        assert!(!game(&["UNDER_RISK"], &[], &["UNDER_RISK"]).is_hit());
    }

    #[test]
    fn history_record_keeps_result_fields_verbatim() {
        let raw = json!(r#"{
            "game_results": [{"game": "A@B", "actual_away_sog": 31, "actual_total": "6"}],
            "player_results": {"not": "a list"},
            "accuracy": {"overall_hit_rate": 0.5, "model_version": "v3"},
            "learning_insights": [{"insight": "dropped"}]
        }"#);
        let record = history_record("2026-02-27", &raw);

        assert_eq!(
            record,
            json!({
                "date": "2026-02-27",
                "game_results": [{"game": "A@B", "actual_away_sog": 31, "actual_total": "6"}],
                "player_results": [],
                "accuracy": {"overall_hit_rate": 0.5, "model_version": "v3"}
            })
        );
    }

    #[test]
    fn unflagged_record_is_never_a_hit() {
        let record = game(&[], &[], &[]);
        assert!(record.is_unflagged());
        assert!(!record.is_hit());
    }

    #[test]
    fn consistent_buckets_have_no_violations() {
        let record = game(&["O1.5_100", "2G+", "3G+"], &["o1.5_100", "3G+"], &["2G+"]);
        assert!(record.flag_violations().is_empty());
    }

    #[test]
    fn violations_are_reported_not_corrected() {
        let record = game(&["SURE2"], &["SURE2", "2G+"], &["sure2", "3G+"]);
        assert_eq!(
            record.flag_violations(),
            vec![
                FlagViolation::HitAndMissed("SURE2".to_string()),
                FlagViolation::HitNotProjected("2G+".to_string()),
                FlagViolation::MissedNotProjected("3G+".to_string()),
            ]
        );
        assert_eq!(record.flags_hit.len(), 2);
    }

    #[test]
    fn deltas_need_both_sides() {
        let result = GameResult {
            projected_total: Some(5.5),
            actual_total: Some(7.0),
            projected_home_goals: Some(3.0),
            ..GameResult::default()
        };
        assert_eq!(result.total_delta(), Some(1.5));
        assert_eq!(result.home_goals_delta(), None);

        let player = PlayerResult {
            projected_sog: Some(4.2),
            actual_sog: Some(5.0),
            ..PlayerResult::default()
        };
        assert!(player.sog_delta().is_some_and(|value| (value - 0.8).abs() < 1e-9));
        assert_eq!(player.pts_delta(), None);
    }

    #[test]
    fn report_parses_string_payload_and_defaults_bad_fields() {
        let raw = json!(json!({
            "game_results": [{"game": "CGY@PIT", "flags_projected": ["SURE2"], "flags_hit": ["SURE2"], "flags_missed": []}],
            "player_results": "nope",
            "accuracy": {"overall_hit_rate": 0.72},
            "learning_insights": [{"category": "SOG Accuracy", "insight": "road bias", "suggested_action": "adjust"}],
            "metadata": {"date": "2026-02-27", "games_analyzed": 1, "players_analyzed": 0}
        })
        .to_string());

        let report = ReconciliationReport::from_agent_result(&raw);
        assert_eq!(report.game_results.len(), 1);
        assert!(report.player_results.is_empty());
        assert_eq!(
            report.accuracy.as_ref().and_then(|accuracy| accuracy.overall_hit_rate),
            Some(0.72)
        );
        assert_eq!(report.learning_insights.len(), 1);
        assert_eq!(
            report.metadata.and_then(|meta| meta.games_analyzed),
            Some(1)
        );
    }

    #[test]
    fn malformed_report_is_empty() {
        let report = ReconciliationReport::from_agent_result(&json!("{{{"));
        assert!(report.is_empty());
        assert!(report.learning_insights.is_empty());
    }

    #[test]
    fn history_entry_carries_results_and_accuracy() {
        let report = ReconciliationReport {
            game_results: vec![game(&["SURE2"], &["SURE2"], &[])],
            accuracy: Some(AccuracyData {
                overall_hit_rate: Some(1.0),
                ..AccuracyData::default()
            }),
            ..ReconciliationReport::default()
        };
        let entry = report.to_history_entry("2026-02-27");
        assert_eq!(entry.date.as_deref(), Some("2026-02-27"));
        assert_eq!(entry.game_results, report.game_results);
        assert_eq!(entry.accuracy, report.accuracy);
    }

    #[test]
    fn instruction_embeds_date_and_projection_json() {
        let text = reconciliation_instruction("2026-02-27", &json!({"games": []}));
        assert_eq!(
            text,
            r#"Compare projections against actual results for 2026-02-27. Here are the projections: {"games":[]}"#
        );
    }
}
