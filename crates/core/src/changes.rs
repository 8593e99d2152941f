// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Changes-table rows and their aggregation into a report summary.

use crate::model::{Benchmark, Colorcode, RowId};
use crate::trend::{Classification, TrendOutcome};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// One benchmark of a changes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub benchmark_id: RowId,
    pub benchmark: String,
    pub units_title: String,
    pub units: String,
    pub lessisbetter: bool,
    /// Baseline the new value was compared with.
    pub old_value: Option<f64>,
    pub new_value: f64,
    pub std_dev: Option<f64>,
    pub percent_change: Option<f64>,
    pub delta: String,
    pub classification: Classification,
}

impl ChangeRow {
    /// Combine a benchmark, its new value and the analyzer verdict.
    pub fn new(benchmark: &Benchmark, new_value: f64, std_dev: Option<f64>, outcome: TrendOutcome) -> Self {
        Self {
            benchmark_id: benchmark.id,
            benchmark: benchmark.name.clone(),
            units_title: benchmark.units_title.clone(),
            units: benchmark.units.clone(),
            lessisbetter: benchmark.lessisbetter,
            old_value: outcome.baseline,
            new_value,
            std_dev,
            percent_change: outcome.percent_change,
            delta: outcome.delta,
            classification: outcome.classification,
        }
    }

    /// Row colour for display.
    pub fn color(&self) -> &'static str {
        self.classification.color()
    }
}

/// Sort rows into the stable table order: units title, then benchmark name.
pub fn sort_rows(rows: &mut [ChangeRow]) {
    rows.sort_by(|a, b| {
        a.units_title
            .cmp(&b.units_title)
            .then_with(|| a.benchmark.cmp(&b.benchmark))
            .then_with(|| a.benchmark_id.cmp(&b.benchmark_id))
    });
}

/// Colour and description stored on a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub colorcode: Colorcode,
    pub item_description: String,
}

/// Aggregate per-benchmark rows.
///
/// Regressions dominate: a single red row makes the report red even when
/// other rows improved.
pub fn summarize(rows: &[ChangeRow]) -> ReportSummary {
    let has = |c: Classification| rows.iter().any(|r| r.classification == c);

    let colorcode = if has(Classification::Regression) {
        Colorcode::Red
    } else if has(Classification::Improvement) {
        Colorcode::Green
    } else {
        Colorcode::None
    };

    let mut item_description = String::new();
    // Writing into a String cannot fail.
    let _ = write_description(&mut item_description, rows);

    ReportSummary {
        colorcode,
        item_description,
    }
}

/// One line per significant row: regressions, then improvements, then
/// neutral trends.
fn write_description(out: &mut String, rows: &[ChangeRow]) -> fmt::Result {
    for wanted in [
        Classification::Regression,
        Classification::Improvement,
        Classification::NeutralTrend,
    ] {
        for row in rows.iter().filter(|r| r.classification == wanted) {
            if !out.is_empty() {
                writeln!(out)?;
            }
            describe_row(out, row)?;
        }
    }
    Ok(())
}

fn describe_row(out: &mut String, row: &ChangeRow) -> fmt::Result {
    write!(out, "{}: {} {}", row.benchmark, row.delta, row.classification)?;
    if let Some(old) = row.old_value {
        write!(
            out,
            " ({} -> {} {})",
            format_value(old),
            format_value(row.new_value),
            row.units
        )?;
    }
    Ok(())
}

/// Compact numeric formatting: four decimals with trailing zeros removed.
pub fn format_value(value: f64) -> String {
    let s = format!("{:.4}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
