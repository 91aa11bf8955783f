//! Flag vocabulary and classification.
//!
//! Flags are open-vocabulary uppercase tokens (`SURE2`, `O1.5_100`, `2G+`,
//! `UNDER_RISK`, ...). They carry no state; every question about a flag is
//! answered by case-insensitive substring tests.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    Over,
    Under,
    MultiGoal,
    Environment,
    Risk,
    Neutral,
}

impl FlagCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Under => "under",
            Self::MultiGoal => "multi_goal",
            Self::Environment => "environment",
            Self::Risk => "risk",
            Self::Neutral => "neutral",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "over" => Some(Self::Over),
            "under" => Some(Self::Under),
            "multi_goal" => Some(Self::MultiGoal),
            "environment" => Some(Self::Environment),
            "risk" => Some(Self::Risk),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

// Evaluated in order; the first rule with a matching needle wins.
const RULES: &[(&[&str], FlagCategory)] = &[
    (&["SURE2"], FlagCategory::Over),
    (&["O1", "O2", "OVER"], FlagCategory::Over),
    (&["UNDER", "U1", "U2"], FlagCategory::Under),
    (&["2G", "3G"], FlagCategory::MultiGoal),
    (&["HIGH", "ENV"], FlagCategory::Environment),
    (&["RISK"], FlagCategory::Risk),
];

/// Classifies a flag into its semantic bucket.
#[must_use]
pub fn classify(flag: &str) -> FlagCategory {
    let upper = flag.to_ascii_uppercase();
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| upper.contains(needle)))
        .map_or(FlagCategory::Neutral, |(_, category)| *category)
}

/// `SURE2` is the strongest positive signal in the vocabulary.
#[must_use]
pub fn is_strong_positive(flag: &str) -> bool {
    contains_ignore_case(flag, "SURE2")
}

/// True for any flag mentioning risk, including `UNDER_RISK` which
/// classifies as [`FlagCategory::Under`].
#[must_use]
pub fn is_risk(flag: &str) -> bool {
    contains_ignore_case(flag, "RISK")
}

#[must_use]
pub fn flags_equal(lhs: &str, rhs: &str) -> bool {
    lhs.eq_ignore_ascii_case(rhs)
}

/// Case-insensitive membership test.
#[must_use]
pub fn contains_flag(flags: &[String], flag: &str) -> bool {
    flags.iter().any(|candidate| flags_equal(candidate, flag))
}

/// True when any flag in the set contains `needle`, ignoring case.
#[must_use]
pub fn any_flag_contains(flags: &[String], needle: &str) -> bool {
    flags.iter().any(|flag| contains_ignore_case(flag, needle))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_uppercase()
        .contains(&needle.to_ascii_uppercase())
}
