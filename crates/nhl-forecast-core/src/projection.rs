//! Projection Record Builder.
//!
//! Validates projection-agent output into game and player projections. A
//! new build supersedes the previous projection set; records are never
//! merged across runs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Date, OffsetDateTime};

use crate::flag::{any_flag_contains, is_strong_positive};
use crate::lenient::{self, array_field};
use crate::store::{read_json, write_json_swallowed, KeyValueStore, PROJECTIONS_KEY};
use crate::{format_long_date, format_rfc3339, ForecastError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameProjection {
    /// Fixture key in `AWAY@HOME` form.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub away_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub home_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub away_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub home_goals: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags: Vec<String>,
}

impl GameProjection {
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::classify(self.env.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerProjection {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub opp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub gp: Option<u32>,
    /// Average time on ice, `MM:SS`.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub toi: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub pp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub p_2plus_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub p_3plus_sog: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub pts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub p_1plus_pts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub sog_conf: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub pts_conf: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub flags: Vec<String>,
}

impl PlayerProjection {
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::classify(self.env.as_deref())
    }

    #[must_use]
    pub fn has_strong_positive(&self) -> bool {
        self.flags.iter().any(|flag| is_strong_positive(flag))
    }

    #[must_use]
    pub fn has_risk(&self) -> bool {
        any_flag_contains(&self.flags, "RISK")
    }

    #[must_use]
    pub fn has_under_risk(&self) -> bool {
        any_flag_contains(&self.flags, "UNDER_RISK")
    }

    /// Whether the player takes part in the `AWAY@HOME` fixture.
    #[must_use]
    pub fn plays_in(&self, fixture: &str) -> bool {
        let team = self.team.as_deref().unwrap_or_default();
        let opp = self.opp.as_deref().unwrap_or_default();
        if fixture == format!("{team}@{opp}") || fixture == format!("{opp}@{team}") {
            return true;
        }

        let mut sides = fixture.split('@');
        let away = sides.next();
        let home = sides.next();
        away == Some(team) || home == Some(team)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectionMeta {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub num_games: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub data_sources: Option<String>,
}

/// The current projection set as persisted under [`PROJECTIONS_KEY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectionSet {
    /// RFC3339 timestamp of the build that produced this set.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::record_list")]
    pub games: Vec<GameProjection>,
    #[serde(default, deserialize_with = "lenient::record_list")]
    pub players: Vec<PlayerProjection>,
    #[serde(default, deserialize_with = "lenient::opt_record", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProjectionMeta>,
}

impl ProjectionSet {
    /// Builds a projection set from a raw agent `result` (object or JSON
    /// string). Never fails: unparseable payloads and non-array fields yield
    /// empty lists.
    ///
    /// # Errors
    /// Returns [`ForecastError::Format`] only when `built_at` cannot be
    /// rendered as RFC3339.
    pub fn from_agent_result(raw: &Value, built_at: OffsetDateTime) -> Result<Self, ForecastError> {
        ProjectionBuild::from_agent_result(raw, built_at).map(|build| build.set)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.players.is_empty()
    }

    /// Loads the stored set; absent or corrupt values yield an empty set.
    #[must_use]
    pub fn load(store: &dyn KeyValueStore) -> Self {
        lenient::decode(&read_json(store, PROJECTIONS_KEY, lenient::empty_object()))
    }

    /// Overwrites the stored set with its typed form. Fields the typed view
    /// does not model are not written; use [`ProjectionBuild::persist`] for
    /// agent output. Store failures are swallowed and reported as `false`.
    pub fn persist(&self, store: &mut dyn KeyValueStore) -> bool {
        match serde_json::to_value(self) {
            Ok(value) => write_json_swallowed(store, PROJECTIONS_KEY, &value),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode projection set");
                false
            }
        }
    }

    /// Distinct fixture keys in first-seen order.
    #[must_use]
    pub fn game_options(&self) -> Vec<String> {
        let mut options: Vec<String> = Vec::new();
        for game in self.games.iter().filter_map(|game| game.game.as_deref()) {
            if !game.is_empty() && !options.iter().any(|seen| seen == game) {
                options.push(game.to_string());
            }
        }
        options
    }
}

/// One projection-agent response.
///
/// `record` is what gets stored under [`PROJECTIONS_KEY`]: the agent's
/// `games`, `players` and `metadata` exactly as sent, stamped with the build
/// time. Unknown fields and loosely typed values stay in the record so the
/// reconciliation agent sees them; `set` is the lenient typed view of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionBuild {
    pub set: ProjectionSet,
    pub record: Value,
}

impl ProjectionBuild {
    /// # Errors
    /// Returns [`ForecastError::Format`] only when `built_at` cannot be
    /// rendered as RFC3339.
    pub fn from_agent_result(raw: &Value, built_at: OffsetDateTime) -> Result<Self, ForecastError> {
        let payload = lenient::decode_payload(raw);
        let mut record = Map::new();
        record.insert("date".to_string(), Value::String(format_rfc3339(built_at)?));
        record.insert("games".to_string(), Value::Array(array_field::<Value>(&payload, "games")));
        record.insert("players".to_string(), Value::Array(array_field::<Value>(&payload, "players")));
        if let Some(metadata) = payload.get("metadata").filter(|value| value.is_object()) {
            record.insert("metadata".to_string(), metadata.clone());
        }

        let record = Value::Object(record);
        Ok(Self {
            set: lenient::decode(&record),
            record,
        })
    }

    /// Overwrites the stored set with the verbatim record. Store failures
    /// are swallowed and reported as `false`.
    pub fn persist(&self, store: &mut dyn KeyValueStore) -> bool {
        write_json_swallowed(store, PROJECTIONS_KEY, &self.record)
    }
}

/// Instruction sent to the projection agent for `today`.
///
/// # Errors
/// Returns [`ForecastError::Format`] when the date cannot be spelled out.
pub fn projection_instruction(today: Date) -> Result<String, ForecastError> {
    let spelled = format_long_date(today)?;
    Ok(format!(
        "Today is {spelled}. Automatically look up the full NHL schedule for today, fetch all relevant team and player stats, and generate complete projections for every game being played today. Do NOT ask me for matchups \u{2014} find them yourself via web search."
    ))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    HighEvent,
    LowEvent,
    Neutral,
}

impl Environment {
    #[must_use]
    pub fn classify(env: Option<&str>) -> Self {
        let Some(raw) = env else {
            return Self::Neutral;
        };
        let upper = raw.to_ascii_uppercase();
        if upper.contains("HIGH") {
            Self::HighEvent
        } else if upper.contains("LOW") {
            Self::LowEvent
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSort {
    #[default]
    Sog,
    Pts,
    Sure2,
    Risk,
}

impl PlayerSort {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sog => "sog",
            Self::Pts => "pts",
            Self::Sure2 => "sure2",
            Self::Risk => "risk",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sog" => Some(Self::Sog),
            "pts" => Some(Self::Pts),
            "sure2" => Some(Self::Sure2),
            "risk" => Some(Self::Risk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerQuery {
    pub sort: PlayerSort,
    /// `AWAY@HOME` fixture; `None` selects every game.
    pub game: Option<String>,
    pub hide_under_risk: bool,
}

/// Filters and orders players for display.
#[must_use]
pub fn select_players(players: &[PlayerProjection], query: &PlayerQuery) -> Vec<PlayerProjection> {
    let mut selected: Vec<PlayerProjection> = players
        .iter()
        .filter(|player| {
            query
                .game
                .as_deref()
                .map_or(true, |fixture| player.plays_in(fixture))
        })
        .filter(|player| !(query.hide_under_risk && player.has_under_risk()))
        .cloned()
        .collect();

    selected.sort_by(|lhs, rhs| match query.sort {
        PlayerSort::Sog => by_desc(lhs.sog, rhs.sog),
        PlayerSort::Pts => by_desc(lhs.pts, rhs.pts),
        PlayerSort::Sure2 => rhs
            .has_strong_positive()
            .cmp(&lhs.has_strong_positive())
            .then_with(|| by_desc(lhs.sog, rhs.sog)),
        PlayerSort::Risk => lhs
            .has_risk()
            .cmp(&rhs.has_risk())
            .then_with(|| by_desc(lhs.sog, rhs.sog)),
    });
    selected
}

fn by_desc(lhs: Option<f64>, rhs: Option<f64>) -> Ordering {
    rhs.unwrap_or(0.0).total_cmp(&lhs.unwrap_or(0.0))
}
