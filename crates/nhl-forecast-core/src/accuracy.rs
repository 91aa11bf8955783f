//! Accuracy Aggregator.
//!
//! `overall_hit_rate` and `flag_accuracy` are agent computations and pass
//! through untouched. The only local derivations are calibration bucketing by
//! range label, the fixed KPI strip, and an optional locally computed
//! estimate used when the agent omitted the overall rate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::reconcile::FlagOutcome;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccuracyData {
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub overall_hit_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number_map")]
    pub flag_accuracy: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "lenient::record_list")]
    pub confidence_calibration: Vec<CalibrationEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalibrationEntry {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
}

/// Calibration entries sharing one range label, in first-seen order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalibrationBucket {
    pub range: String,
    pub entries: Vec<CalibrationEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum KpiTier {
    Strong,
    Fair,
    Weak,
    Unavailable,
}

impl KpiTier {
    #[must_use]
    pub fn for_rate(rate: Option<f64>) -> Self {
        match rate {
            None => Self::Unavailable,
            Some(value) if value >= 0.75 => Self::Strong,
            Some(value) if value >= 0.55 => Self::Fair,
            Some(_) => Self::Weak,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Fair => "fair",
            Self::Weak => "weak",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Kpi {
    pub label: &'static str,
    pub value: Option<f64>,
    pub display: String,
    pub tier: KpiTier,
}

impl Kpi {
    fn new(label: &'static str, value: Option<f64>) -> Self {
        Self {
            label,
            value,
            display: format_rate(value),
            tier: KpiTier::for_rate(value),
        }
    }
}

// Label, `flag_accuracy` key.
const FLAG_KPIS: &[(&str, &str)] = &[
    ("SURE2", "sure2"),
    ("O1.5", "o1_5_100"),
    ("U1.5", "u1_5_100"),
    ("2G+", "two_g_plus"),
    ("3G+", "three_g_plus"),
    ("U2.5", "u2_5"),
];

/// Renders a 0..1 rate as a whole percentage, or `--` when unavailable.
#[must_use]
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(value) if value.is_finite() => format!("{:.0}%", value * 100.0),
        _ => "--".to_string(),
    }
}

impl AccuracyData {
    /// Groups calibration entries by their stated range label. Entries with
    /// no label share the `-` bucket. Nothing is merged across entries.
    #[must_use]
    pub fn calibration_buckets(&self) -> Vec<CalibrationBucket> {
        let mut buckets: Vec<CalibrationBucket> = Vec::new();
        for entry in &self.confidence_calibration {
            let label = entry.range.clone().unwrap_or_else(|| "-".to_string());
            match buckets.iter_mut().find(|bucket| bucket.range == label) {
                Some(bucket) => bucket.entries.push(entry.clone()),
                None => buckets.push(CalibrationBucket {
                    range: label,
                    entries: vec![entry.clone()],
                }),
            }
        }
        buckets
    }

    /// The fixed KPI strip: Overall followed by the six tracked flags.
    #[must_use]
    pub fn kpis(&self) -> Vec<Kpi> {
        std::iter::once(Kpi::new("Overall", self.overall_hit_rate))
            .chain(
                FLAG_KPIS
                    .iter()
                    .map(|&(label, key)| Kpi::new(label, self.flag_accuracy.get(key).copied())),
            )
            .collect()
    }

    #[must_use]
    pub fn flag_rate(&self, key: &str) -> Option<f64> {
        self.flag_accuracy.get(key).copied()
    }
}

/// Locally computed hit rate over reconciled records.
///
/// Unflagged records are neither hits nor misses and are left out of both
/// numerator and denominator. Returns `None` when no flagged record exists.
#[must_use]
pub fn local_estimate<'a, I>(records: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a dyn FlagOutcome>,
{
    let (hits, counted) = records
        .into_iter()
        .filter(|record| !record.is_unflagged())
        .fold((0_u32, 0_u32), |(hits, counted), record| {
            (hits + u32::from(record.is_hit()), counted + 1)
        });
    (counted > 0).then(|| f64::from(hits) / f64::from(counted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{GameResult, PlayerResult};
    use serde_json::json;

    fn sample_accuracy() -> AccuracyData {
        lenient::decode(&json!({
            "overall_hit_rate": 0.72,
            "flag_accuracy": {"sure2": 0.85, "o1_5_100": 0.78, "u1_5_100": 0.65, "two_g_plus": 0.55, "three_g_plus": 0.42},
            "confidence_calibration": [
                {"range": "80-100%", "accuracy": 0.82, "sample_size": 45},
                {"range": "60-80%", "accuracy": 0.68, "sample_size": 120},
                {"range": "80-100%", "accuracy": 0.79, "sample_size": 12}
            ]
        }))
    }

    #[test]
    fn agent_rates_pass_through_verbatim() {
        let accuracy = sample_accuracy();
        assert_eq!(accuracy.overall_hit_rate, Some(0.72));
        assert_eq!(accuracy.flag_rate("sure2"), Some(0.85));
        assert_eq!(accuracy.flag_rate("u2_5"), None);
    }

    #[test]
    fn calibration_groups_by_label_without_aggregating() {
        let buckets = sample_accuracy().calibration_buckets();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].range, "80-100%");
        assert_eq!(buckets[0].entries.len(), 2);
        assert_eq!(buckets[0].entries[1].accuracy, Some(0.79));
        assert_eq!(buckets[1].range, "60-80%");
    }

    #[test]
    fn kpi_strip_renders_missing_values_as_unavailable() {
        let kpis = sample_accuracy().kpis();
        let labels: Vec<_> = kpis.iter().map(|kpi| kpi.label).collect();
        assert_eq!(labels, ["Overall", "SURE2", "O1.5", "U1.5", "2G+", "3G+", "U2.5"]);
        assert_eq!(kpis[0].display, "72%");
        assert_eq!(kpis[1].tier, KpiTier::Strong);
        assert_eq!(kpis[3].tier, KpiTier::Fair);
        assert_eq!(kpis[5].tier, KpiTier::Weak);
        assert_eq!(kpis[6].display, "--");
        assert_eq!(kpis[6].tier, KpiTier::Unavailable);
    }

    #[test]
    fn mistyped_accuracy_fields_default() {
        let accuracy: AccuracyData = lenient::decode(&json!({
            "overall_hit_rate": "high",
            "flag_accuracy": {"sure2": "0.9", "o1_5_100": 0.7},
            "confidence_calibration": "none"
        }));
        assert_eq!(accuracy.overall_hit_rate, None);
        assert_eq!(accuracy.flag_accuracy.len(), 1);
        assert!(accuracy.confidence_calibration.is_empty());
    }

    #[test]
    fn format_rate_rounds_to_whole_percent() {
        assert_eq!(format_rate(Some(0.856)), "86%");
        assert_eq!(format_rate(Some(0.0)), "0%");
        assert_eq!(format_rate(None), "--");
        assert_eq!(format_rate(Some(f64::NAN)), "--");
    }

    #[test]
    fn local_estimate_excludes_unflagged_records() {
        let owned = |flags: &[&str]| flags.iter().map(ToString::to_string).collect::<Vec<_>>();
        let hit = GameResult {
            flags_projected: owned(&["SURE2"]),
            flags_hit: owned(&["SURE2"]),
            ..GameResult::default()
        };
        let miss = PlayerResult {
            flags_projected: owned(&["2G+"]),
            flags_missed: owned(&["2G+"]),
            ..PlayerResult::default()
        };
        let unflagged = PlayerResult::default();

        let records: Vec<&dyn FlagOutcome> = vec![&hit, &miss, &unflagged];
        assert_eq!(local_estimate(records), Some(0.5));

        let only_unflagged: Vec<&dyn FlagOutcome> = vec![&unflagged];
        assert_eq!(local_estimate(only_unflagged), None);
    }
}
