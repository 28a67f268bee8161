use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// Width in score points of the "stable" trend band and the "near" threshold
/// band. Both classifications share this one constant.
pub const SCORE_BAND: f64 = 5.0;

/// Half-up rounding to 2 decimals, applied to externally visible averages:
/// `Int(100*x + 0.5) / 100`. Accumulation stays full precision.
pub fn round2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Arithmetic mean; an empty slice yields 0 by convention (a student with no
/// scores reports average 0, never an error).
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AnalyticsError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// A record carrying one numeric score. Lets the aggregator run over raw
/// score rows as well as already-derived per-student values.
pub trait ScoreLike {
    fn value(&self) -> f64;
}

impl ScoreLike for f64 {
    fn value(&self) -> f64 {
        *self
    }
}

impl<T: ScoreLike> ScoreLike for &T {
    fn value(&self) -> f64 {
        (*self).value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    pub sum: f64,
    pub count: usize,
}

impl Aggregate {
    pub fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / (self.count as f64)
    }
}

/// Reduces score-like records into per-key sums and counts. Every grouping in
/// the system (by subject, by tryout, by classroom, by student) goes through
/// this one reduction; a key with no records never appears in the output, so
/// no division by zero is ever surfaced.
pub fn aggregate<I, T, K, F>(items: I, mut key: F) -> HashMap<K, Aggregate>
where
    I: IntoIterator<Item = T>,
    T: ScoreLike,
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut groups: HashMap<K, Aggregate> = HashMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().add(item.value());
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub delta: f64,
    pub improving: bool,
}

impl Trend {
    fn flat() -> Self {
        Self {
            delta: 0.0,
            improving: false,
        }
    }

    fn from_delta(delta: f64) -> Self {
        Self {
            delta,
            improving: delta > 0.0,
        }
    }
}

/// Whole-series trend: last value minus first. Series must be ordered
/// chronologically ascending by the caller.
pub fn trend_overall(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::flat();
    }
    Trend::from_delta(values[values.len() - 1] - values[0])
}

/// Step trend: last value minus second-to-last.
pub fn trend_last_step(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::flat();
    }
    Trend::from_delta(values[values.len() - 1] - values[values.len() - 2])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendLabel {
    Up,
    Down,
    Stable,
}

impl TrendLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendLabel::Up => "up",
            TrendLabel::Down => "down",
            TrendLabel::Stable => "stable",
        }
    }
}

/// Classifies a delta into a trend label. The band is exclusive: a delta of
/// exactly +/- SCORE_BAND is still "stable".
pub fn trend_label(delta: f64) -> TrendLabel {
    if delta > SCORE_BAND {
        TrendLabel::Up
    } else if delta < -SCORE_BAND {
        TrendLabel::Down
    } else {
        TrendLabel::Stable
    }
}

#[derive(Debug, Clone)]
pub struct CohortMember {
    pub id: String,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub position: usize,
    pub cohort_size: usize,
}

/// 1-based position of `target_id` in the cohort ordered by average
/// descending. The sort is stable on the averages, so equal-average members
/// keep the caller's order. A target missing from its own cohort is a caller
/// bug and fails loudly rather than returning position 0.
pub fn rank(cohort: &[CohortMember], target_id: &str) -> Result<Rank, AnalyticsError> {
    let mut ordered: Vec<&CohortMember> = cohort.iter().collect();
    ordered.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(Ordering::Equal)
    });
    let position = ordered
        .iter()
        .position(|m| m.id == target_id)
        .ok_or_else(|| AnalyticsError::new("not_found", "student not in ranking cohort"))?;
    Ok(Rank {
        position: position + 1,
        cohort_size: ordered.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCheck {
    pub passed: bool,
    pub gap: f64,
}

/// Compares a value against a subject's passing threshold (KKM). Callers must
/// not invoke this for subjects without a threshold; absence is "no
/// comparison", not "pass by default".
pub fn compare_threshold(value: f64, kkm: f64) -> ThresholdCheck {
    ThresholdCheck {
        passed: value >= kkm,
        gap: value - kkm,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdStatus {
    Above,
    Near,
    Below,
}

impl ThresholdStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdStatus::Above => "above",
            ThresholdStatus::Near => "near",
            ThresholdStatus::Below => "below",
        }
    }
}

/// Score-coloring classification: passing is "above", failing within
/// SCORE_BAND points is "near", anything further is "below".
pub fn threshold_status(value: f64, kkm: f64) -> ThresholdStatus {
    if value >= kkm {
        ThresholdStatus::Above
    } else if value >= kkm - SCORE_BAND {
        ThresholdStatus::Near
    } else {
        ThresholdStatus::Below
    }
}
