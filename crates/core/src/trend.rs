// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trend analysis for a single benchmark result.
//!
//! A new value is compared against a trailing window of earlier results on
//! the same branch. The window is reduced to a baseline (median for
//! multi-sample benchmarks, mean otherwise) and the relative change from that
//! baseline decides the classification:
//!
//! ```text
//! pct = (value - baseline) / baseline * 100      (negated when more is better)
//!
//! pct >  change_threshold            -> Regression
//! pct < -change_threshold            -> Improvement
//! |window drift| > trend_threshold   -> NeutralTrend
//! otherwise                          -> NoChange
//! ```
//!
//! Everything here is a pure function of its inputs.

use crate::config::TrendConfig;
use crate::model::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome category of one benchmark against its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Worse than the baseline by more than the change threshold.
    Regression,
    /// Better than the baseline by more than the change threshold.
    Improvement,
    /// Within the change threshold, but the history itself is drifting.
    NeutralTrend,
    /// Nothing notable.
    NoChange,
    /// No usable baseline.
    InsufficientData,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Improvement => "improvement",
            Self::NeutralTrend => "neutral-trend",
            Self::NoChange => "no-change",
            Self::InsufficientData => "insufficient-data",
        }
    }

    /// Display colour of a single row.
    pub fn color(self) -> &'static str {
        match self {
            Self::Regression => "red",
            Self::Improvement => "green",
            Self::NeutralTrend => "grey",
            Self::NoChange | Self::InsufficientData => "none",
        }
    }

    /// Whether the row belongs in a report description.
    pub fn is_notable(self) -> bool {
        matches!(
            self,
            Self::Regression | Self::Improvement | Self::NeutralTrend
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The properties of a benchmark that affect classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkTraits {
    pub data_type: DataType,
    pub lessisbetter: bool,
}

/// Result of analysing one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendOutcome {
    pub classification: Classification,
    /// Signed percent change, "worse" positive. `None` without a baseline.
    pub percent_change: Option<f64>,
    /// Formatted percent change, e.g. `+4.00%`.
    pub delta: String,
    /// Central tendency of the window. `None` when the window is empty.
    pub baseline: Option<f64>,
    /// Drift across the window itself, same sign convention.
    pub drift: Option<f64>,
    /// Number of prior values actually used.
    pub window_len: usize,
}

impl TrendOutcome {
    fn insufficient(baseline: Option<f64>, window_len: usize) -> Self {
        Self {
            classification: Classification::InsufficientData,
            percent_change: None,
            delta: "n/a".to_string(),
            baseline,
            drift: None,
            window_len,
        }
    }
}

/// Classify `value` against `history`.
///
/// `history` holds earlier values of the same series, newest first. Only the
/// first `config.trend_window` entries are used; non-finite entries are
/// ignored.
pub fn analyze(
    config: &TrendConfig,
    traits: BenchmarkTraits,
    value: f64,
    history: &[f64],
) -> TrendOutcome {
    let window: Vec<f64> = history
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .take(config.trend_window.max(1))
        .collect();

    if window.is_empty() || !value.is_finite() {
        return TrendOutcome::insufficient(None, window.len());
    }

    let baseline = match traits.data_type {
        DataType::MultiSample => median(&window),
        DataType::SingleValue => mean(&window),
    };

    let pct = match relative_change(value, baseline, traits.lessisbetter) {
        Some(pct) => pct,
        None => return TrendOutcome::insufficient(Some(baseline), window.len()),
    };

    let drift = window_drift(&window, traits.lessisbetter);

    let classification = if pct > config.change_threshold {
        Classification::Regression
    } else if pct < -config.change_threshold {
        Classification::Improvement
    } else if drift.is_some_and(|d| d.abs() > config.trend_threshold) {
        Classification::NeutralTrend
    } else {
        Classification::NoChange
    };

    TrendOutcome {
        classification,
        percent_change: Some(pct),
        delta: format_delta(pct),
        baseline: Some(baseline),
        drift,
        window_len: window.len(),
    }
}

/// Percent change of `value` from `baseline`, worse-is-positive.
///
/// `None` when the baseline is zero or the result is not finite.
pub fn relative_change(value: f64, baseline: f64, lessisbetter: bool) -> Option<f64> {
    if baseline == 0.0 || !baseline.is_finite() {
        return None;
    }
    let pct = (value - baseline) / baseline * 100.0;
    if !pct.is_finite() {
        return None;
    }
    Some(if lessisbetter { pct } else { -pct })
}

/// Change between the oldest and newest prior value of the window.
fn window_drift(window: &[f64], lessisbetter: bool) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }
    let newest = window[0];
    let oldest = window[window.len() - 1];
    relative_change(newest, oldest, lessisbetter)
}

/// Format a percent change with an explicit sign and two decimals.
pub fn format_delta(pct: f64) -> String {
    format!("{:+.2}%", pct)
}

/// Arithmetic mean. Callers guarantee a non-empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median. Callers guarantee a non-empty slice.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
