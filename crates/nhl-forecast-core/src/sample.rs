//! Demo dataset.
//!
//! Shown when live data is empty and the sample toggle is on. Never written
//! to the store. The raw payloads double as canned responses for the mock
//! agent invoker.

use serde_json::{json, Value};

use crate::ledger::HistoryLedger;
use crate::lenient;
use crate::pattern::PatternAnalysis;
use crate::projection::ProjectionSet;
use crate::reconcile::ReconciliationReport;

pub const SAMPLE_DATE: &str = "2026-02-27";

#[must_use]
pub fn projections_payload() -> Value {
    json!({
        "games": [
            {"game": "CGY@PIT", "env": "NEUTRAL", "away_sog": 28.5, "home_sog": 31.2, "away_goals": 2.4, "home_goals": 2.9, "total": 5.3, "flags": ["SURE2", "O1.5_100"]},
            {"game": "CBJ@COL", "env": "HIGH_EVENT", "away_sog": 25.1, "home_sog": 34.8, "away_goals": 2.1, "home_goals": 3.6, "total": 5.7, "flags": ["O1.5_100", "2G+", "3G+"]},
            {"game": "NJD@TOR", "env": "NEUTRAL", "away_sog": 29.0, "home_sog": 33.5, "away_goals": 2.5, "home_goals": 3.0, "total": 5.5, "flags": ["SURE2"]}
        ],
        "players": [
            {"player": "N. MacKinnon", "team": "COL", "opp": "CBJ", "env": "HIGH_EVENT", "gp": 65, "toi": "21:30", "line": "1L", "pp": "PP1", "sog": 4.2, "p_2plus_sog": 0.82, "p_3plus_sog": 0.61, "pts": 1.4, "p_1plus_pts": 0.78, "sog_conf": 0.91, "pts_conf": 0.85, "flags": ["SURE2", "O1.5_100"]},
            {"player": "S. Crosby", "team": "PIT", "opp": "CGY", "env": "NEUTRAL", "gp": 64, "toi": "20:45", "line": "1L", "pp": "PP1", "sog": 3.1, "p_2plus_sog": 0.68, "p_3plus_sog": 0.41, "pts": 1.1, "p_1plus_pts": 0.72, "sog_conf": 0.84, "pts_conf": 0.79, "flags": ["SURE2"]},
            {"player": "A. Matthews", "team": "TOR", "opp": "NJD", "env": "NEUTRAL", "gp": 60, "toi": "20:10", "line": "1L", "pp": "PP1", "sog": 4.5, "p_2plus_sog": 0.85, "p_3plus_sog": 0.65, "pts": 1.2, "p_1plus_pts": 0.74, "sog_conf": 0.92, "pts_conf": 0.80, "flags": ["SURE2", "O1.5_100", "2G+"]},
            {"player": "J. Gaudreau", "team": "CBJ", "opp": "COL", "env": "HIGH_EVENT", "gp": 66, "toi": "19:20", "line": "1L", "pp": "PP1", "sog": 2.8, "p_2plus_sog": 0.55, "p_3plus_sog": 0.28, "pts": 0.9, "p_1plus_pts": 0.65, "sog_conf": 0.76, "pts_conf": 0.70, "flags": ["UNDER_RISK"]}
        ],
        "metadata": {"date": SAMPLE_DATE, "num_games": 3, "generated_at": "2026-02-27T15:00:00Z", "data_sources": "sample"}
    })
}

#[must_use]
pub fn results_payload() -> Value {
    json!({
        "game_results": [
            {"game": "CGY@PIT", "projected_total": 5.3, "actual_total": 5, "projected_away_goals": 2.4, "actual_away_goals": 2, "projected_home_goals": 2.9, "actual_home_goals": 3, "flags_projected": ["SURE2", "O1.5_100"], "flags_hit": ["SURE2", "O1.5_100"], "flags_missed": []},
            {"game": "CBJ@COL", "projected_total": 5.7, "actual_total": 7, "projected_away_goals": 2.1, "actual_away_goals": 3, "projected_home_goals": 3.6, "actual_home_goals": 4, "flags_projected": ["O1.5_100", "2G+", "3G+"], "flags_hit": ["O1.5_100", "3G+"], "flags_missed": ["2G+"]}
        ],
        "player_results": [
            {"player": "N. MacKinnon", "team": "COL", "projected_sog": 4.2, "actual_sog": 5, "projected_pts": 1.4, "actual_pts": 2, "flags_projected": ["SURE2", "O1.5_100"], "flags_hit": ["SURE2", "O1.5_100"], "flags_missed": []},
            {"player": "S. Crosby", "team": "PIT", "projected_sog": 3.1, "actual_sog": 2, "projected_pts": 1.1, "actual_pts": 1, "flags_projected": ["SURE2"], "flags_hit": ["SURE2"], "flags_missed": []}
        ],
        "accuracy": {
            "overall_hit_rate": 0.72,
            "flag_accuracy": {"sure2": 0.85, "o1_5_100": 0.78, "u1_5_100": 0.65, "two_g_plus": 0.55, "three_g_plus": 0.42, "u2_5": 0.60},
            "confidence_calibration": [
                {"range": "80-100%", "accuracy": 0.82, "sample_size": 45},
                {"range": "60-80%", "accuracy": 0.68, "sample_size": 120}
            ]
        },
        "learning_insights": [
            {"category": "SOG Accuracy", "insight": "Player SOG projections over-estimate by 0.3 on average for road teams", "suggested_action": "Apply -0.3 correction for away players"},
            {"category": "Flag Performance", "insight": "SURE2 flag maintains 85% accuracy across 200+ sample", "suggested_action": "Continue using SURE2 as primary confidence indicator"}
        ],
        "metadata": {"date": SAMPLE_DATE, "games_analyzed": 2, "players_analyzed": 2}
    })
}

#[must_use]
pub fn history_payload() -> Value {
    json!([
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
    ])
}

#[must_use]
pub fn patterns_payload() -> Value {
    json!({
        "patterns": [
            {"id": "P1", "name": "High-Event Home Favorite", "description": "Home favorites in high-event environments with top-line deployment consistently exceed projected SOG totals", "signals": ["HOME_FAV", "HIGH_EVENT", "1L", "PP1"], "category": "SOG Over", "hit_rate": 0.82, "sample_size": 45, "confidence_level": "High", "recommended_action": "Target SOG overs for home favorites in high-event games", "risk_level": "Low"},
            {"id": "P2", "name": "SURE2 + O1.5 Combo", "description": "When both SURE2 and O1.5_100 flags are present, the player achieves 2+ SOG in 88% of cases", "signals": ["SURE2", "O1.5_100"], "category": "Multi-Flag", "hit_rate": 0.88, "sample_size": 67, "confidence_level": "Very High", "recommended_action": "Prioritize plays with dual SURE2+O1.5 flags", "risk_level": "Very Low"},
            {"id": "P3", "name": "Road Dog Bounce", "description": "Road underdogs with recent 3-game scoring drought show above-average SOG bounce-back rates", "signals": ["ROAD_DOG", "DROUGHT_3G"], "category": "Contrarian", "hit_rate": 0.64, "sample_size": 28, "confidence_level": "Medium", "recommended_action": "Use as secondary filter, not primary", "risk_level": "Medium"}
        ],
        "anti_patterns": [
            {"id": "A1", "name": "Back-to-Back Away Fade", "description": "Players on the second game of a back-to-back on the road consistently underperform SOG projections", "signals": ["B2B", "ROAD", "FATIGUE"], "fail_rate": 0.71, "sample_size": 34, "warning": "Reduce SOG projections by 15-20% for B2B road situations"},
            {"id": "A2", "name": "Low-Event Trap Game", "description": "Games flagged as LOW_EVENT between defensive teams produce significantly fewer shots and goals", "signals": ["LOW_EVENT", "DEF_MATCHUP"], "fail_rate": 0.65, "sample_size": 22, "warning": "Avoid SOG overs in low-event defensive matchups"}
        ],
        "summary": {"total_patterns_found": 12, "top_pattern_hit_rate": 0.88, "most_reliable_category": "Multi-Flag", "overall_recommendation": "Focus on dual-flag plays (SURE2+O1.5) as your highest-confidence tier. Avoid B2B road situations."}
    })
}

/// Sample projection set. Its `date` is the fixed sample build time.
#[must_use]
pub fn projections() -> ProjectionSet {
    let mut set: ProjectionSet = lenient::decode(&projections_payload());
    set.date = Some("2026-02-27T15:00:00Z".to_string());
    set
}

#[must_use]
pub fn reconciliation() -> ReconciliationReport {
    ReconciliationReport::from_agent_result(&results_payload())
}

#[must_use]
pub fn history() -> HistoryLedger {
    match history_payload() {
        Value::Array(items) => HistoryLedger::new(items.iter().map(lenient::decode).collect()),
        _ => HistoryLedger::default(),
    }
}

#[must_use]
pub fn patterns() -> PatternAnalysis {
    PatternAnalysis::from_agent_result(&patterns_payload())
}
