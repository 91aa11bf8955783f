//! Pattern Analyzer output.
//!
//! Patterns are produced fresh by the pattern agent on every analysis and are
//! never persisted. This module only validates and ranks what the agent says.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accuracy::format_rate;
use crate::lenient::{self, array_field, object_field};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub signals: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
}

impl Pattern {
    #[must_use]
    pub fn confidence_tier(&self) -> ConfidenceTier {
        ConfidenceTier::classify(self.confidence_level.as_deref())
    }

    #[must_use]
    pub fn risk_tier(&self) -> RiskTier {
        RiskTier::classify(self.risk_level.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AntiPattern {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub signals: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub fail_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternSummary {
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub total_patterns_found: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub top_pattern_hit_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub most_reliable_category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub overall_recommendation: Option<String>,
}

impl PatternSummary {
    #[must_use]
    pub fn top_hit_rate_display(&self) -> String {
        format_rate(self.top_pattern_hit_rate)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternAnalysis {
    pub patterns: Vec<Pattern>,
    pub anti_patterns: Vec<AntiPattern>,
    pub summary: Option<PatternSummary>,
}

impl PatternAnalysis {
    /// Parses a raw agent `result`. Patterns are ranked by `hit_rate` and
    /// anti-patterns by `fail_rate`, highest first; records without a rate
    /// sink to the end in agent order.
    #[must_use]
    pub fn from_agent_result(raw: &Value) -> Self {
        let payload = lenient::decode_payload(raw);
        let mut patterns: Vec<Pattern> = array_field(&payload, "patterns");
        let mut anti_patterns: Vec<AntiPattern> = array_field(&payload, "anti_patterns");
        patterns.sort_by(|lhs, rhs| rate_desc(lhs.hit_rate, rhs.hit_rate));
        anti_patterns.sort_by(|lhs, rhs| rate_desc(lhs.fail_rate, rhs.fail_rate));
        Self {
            patterns,
            anti_patterns,
            summary: object_field(&payload, "summary"),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.anti_patterns.is_empty() && self.summary.is_none()
    }
}

fn rate_desc(lhs: Option<f64>, rhs: Option<f64>) -> Ordering {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => rhs.total_cmp(&lhs),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Instruction sent to the pattern agent with the full stored ledger.
#[must_use]
pub fn pattern_instruction(history: &Value) -> String {
    format!("Analyze the following prediction history and identify winning patterns: {history}")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// `very high` and `high` are high, `medium` is medium, anything else
    /// (including absent) is low.
    #[must_use]
    pub fn classify(level: Option<&str>) -> Self {
        let level = level.unwrap_or_default().to_lowercase();
        if level.contains("high") {
            Self::High
        } else if level.contains("medium") {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Only `very low` or an exact `low` are low risk; unknown levels are high.
    #[must_use]
    pub fn classify(level: Option<&str>) -> Self {
        let level = level.unwrap_or_default().to_lowercase();
        if level.contains("very low") || level == "low" {
            Self::Low
        } else if level.contains("medium") {
            Self::Medium
        } else {
            Self::High
        }
    }
}
