// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Timeline series, one benchmark at a time.
//!
//! A [`TimelinePager`] walks the selected benchmarks and yields one
//! [`Timeline`] per benchmark that has data, up to the configured page size.
//! Callers stream each timeline as it is produced and finish with the
//! [`TimelineTrailer`], whose `next_benchmarks` cursor resumes the listing.

use crate::Engine;
use benchwatch_core::model::{
    Benchmark, Branch, DataType, Environment, Executable, MeasurementKey, Quartiles, RowId,
};
use benchwatch_core::{Error, Result};
use benchwatch_storage::{dimensions, results, revisions};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Message returned when a first page holds no data.
pub const NO_DATA: &str = "No data found for the selected options";

/// Which benchmarks a timeline request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkSelection {
    /// Every benchmark, by name.
    Grid,
    /// None at all; used by clients that only want the page frame.
    ShowNone,
    /// A single benchmark by name.
    Named(String),
}

impl FromStr for BenchmarkSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::validation("No benchmark selected")),
            "grid" => Ok(Self::Grid),
            "show_none" => Ok(Self::ShowNone),
            name => Ok(Self::Named(name.to_string())),
        }
    }
}

/// Parameters of a timeline request.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineQuery {
    pub executables: Vec<RowId>,
    pub environment: RowId,
    pub benchmarks: BenchmarkSelection,
    /// Points per series; the configured limit when `None`.
    pub revisions: Option<usize>,
    /// Executable and revision whose value is drawn as a flat baseline.
    pub baseline: Option<(RowId, RowId)>,
    /// Resume after this many benchmarks.
    pub next_benchmarks: Option<usize>,
}

/// One point of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    /// Present for multi-sample benchmarks, defaulted to the value when not
    /// stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quartiles: Option<Quartiles>,
    pub short_commitid: String,
    pub tag: String,
    pub branch: String,
}

/// Endpoint of a baseline line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaselinePoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// The series of one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub benchmark: String,
    pub benchmark_id: RowId,
    pub benchmark_description: String,
    pub data_type: DataType,
    pub units: String,
    pub lessisbetter: &'static str,
    /// Branch name, then executable id, then points newest first.
    pub branches: BTreeMap<String, BTreeMap<RowId, Vec<TimelinePoint>>>,
    pub baseline: Option<[BaselinePoint; 2]>,
}

/// Closing information of a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineTrailer {
    pub first: bool,
    #[serde(rename = "nextBenchmarks")]
    pub next_benchmarks: Option<usize>,
    pub error: Option<String>,
}

/// Incremental producer of one timeline page.
pub struct TimelinePager {
    engine: Engine,
    benchmarks: Vec<Benchmark>,
    series: Vec<(Executable, Branch)>,
    environment: Environment,
    revisions: usize,
    baseline: Option<(RowId, RowId)>,
    cursor: Option<usize>,
    show_none: bool,
    page_size: usize,
    position: usize,
    transmitted: usize,
    truncated: bool,
}

impl Engine {
    /// Resolve a timeline request into a pager.
    ///
    /// Unknown executable ids are skipped; executables of untracked projects
    /// or without a default branch contribute no series.
    pub async fn timeline(&self, query: &TimelineQuery) -> Result<TimelinePager> {
        let mut conn = self.db.acquire().await?;

        let mut executables = Vec::new();
        for id in &query.executables {
            if let Some(executable) = dimensions::get_executable(&mut conn, *id).await? {
                executables.push(executable);
            }
        }
        if executables.is_empty() {
            return Err(Error::validation("No executables selected"));
        }

        let environment = dimensions::get_environment(&mut conn, query.environment)
            .await?
            .ok_or_else(|| Error::not_found(format!("Environment {} not found", query.environment)))?;

        let benchmarks = match &query.benchmarks {
            BenchmarkSelection::Grid => dimensions::list_benchmarks(&mut conn).await?,
            BenchmarkSelection::ShowNone => Vec::new(),
            BenchmarkSelection::Named(name) => vec![dimensions::find_benchmark(&mut conn, name)
                .await?
                .ok_or_else(|| Error::not_found(format!("Benchmark '{}' not found", name)))?],
        };

        let mut series = Vec::new();
        for executable in executables {
            let Some(project) = dimensions::get_project(&mut conn, executable.project_id).await? else {
                continue;
            };
            if !project.track {
                continue;
            }
            if let Some(branch) = dimensions::default_branch(&mut conn, &project).await? {
                series.push((executable, branch));
            }
        }

        let revisions = query.revisions.unwrap_or(self.settings.analysis.timeline_limit);
        if revisions == 0 {
            return Err(Error::validation("Number of revisions must be at least 1"));
        }

        Ok(TimelinePager {
            engine: self.clone(),
            benchmarks,
            series,
            environment,
            revisions,
            baseline: query.baseline,
            cursor: query.next_benchmarks.filter(|n| *n > 0),
            show_none: query.benchmarks == BenchmarkSelection::ShowNone,
            page_size: self.settings.analysis.timeline_page_size,
            position: 0,
            transmitted: 0,
            truncated: false,
        })
    }
}

impl TimelinePager {
    /// The next timeline of this page, or `None` when the page is complete.
    pub async fn next_timeline(&mut self) -> Result<Option<Timeline>> {
        while self.position < self.benchmarks.len() {
            if self.transmitted >= self.page_size {
                self.truncated = true;
                return Ok(None);
            }
            let index = self.position;
            self.position += 1;
            if self.cursor.is_some_and(|cursor| self.position <= cursor) {
                continue;
            }
            if let Some(timeline) = self.build(index).await? {
                self.transmitted += 1;
                return Ok(Some(timeline));
            }
        }
        Ok(None)
    }

    /// Drain the page into memory.
    pub async fn collect(&mut self) -> Result<Vec<Timeline>> {
        let mut timelines = Vec::new();
        while let Some(timeline) = self.next_timeline().await? {
            timelines.push(timeline);
        }
        Ok(timelines)
    }

    /// Page trailer. Meaningful once [`Self::next_timeline`] returned `None`.
    pub fn trailer(&self) -> TimelineTrailer {
        let first = self.cursor.is_none();
        let error = (first && self.transmitted == 0 && !self.show_none).then(|| NO_DATA.to_string());
        TimelineTrailer {
            first,
            next_benchmarks: self.truncated.then_some(self.position),
            error,
        }
    }

    async fn build(&self, index: usize) -> Result<Option<Timeline>> {
        let benchmark = &self.benchmarks[index];
        let mut conn = self.engine.db.acquire().await?;

        let mut branches: BTreeMap<String, BTreeMap<RowId, Vec<TimelinePoint>>> = BTreeMap::new();
        for (executable, branch) in &self.series {
            let points = results::series(
                &mut conn,
                benchmark.id,
                executable.id,
                self.environment.id,
                branch.id,
                self.revisions,
            )
            .await?;
            if points.is_empty() {
                continue;
            }
            let points = points
                .into_iter()
                .map(|p| TimelinePoint {
                    date: p.revision.date,
                    value: p.measurement.value,
                    std_dev: p.measurement.std_dev,
                    quartiles: (benchmark.data_type == DataType::MultiSample)
                        .then(|| p.measurement.quartiles_or_flat()),
                    short_commitid: p.revision.short_commitid().to_string(),
                    tag: p.revision.tag.clone(),
                    branch: branch.name.clone(),
                })
                .collect();
            branches
                .entry(branch.name.clone())
                .or_default()
                .insert(executable.id, points);
        }

        if branches.is_empty() {
            debug!(benchmark = %benchmark.name, "No timeline data");
            return Ok(None);
        }

        let baseline = match self.baseline {
            Some((executable_id, revision_id)) => {
                baseline_line(&mut conn, benchmark, &self.environment, executable_id, revision_id, &branches).await?
            }
            None => None,
        };

        Ok(Some(Timeline {
            benchmark: benchmark.name.clone(),
            benchmark_id: benchmark.id,
            benchmark_description: benchmark.description.clone(),
            data_type: benchmark.data_type,
            units: benchmark.units.clone(),
            lessisbetter: benchmark.direction_label(),
            branches,
            baseline,
        }))
    }
}

/// A flat line at the baseline value spanning the longest series.
async fn baseline_line(
    conn: &mut benchwatch_storage::SqliteConnection,
    benchmark: &Benchmark,
    environment: &Environment,
    executable_id: RowId,
    revision_id: RowId,
    branches: &BTreeMap<String, BTreeMap<RowId, Vec<TimelinePoint>>>,
) -> Result<Option<[BaselinePoint; 2]>> {
    if revisions::get_revision(&mut *conn, revision_id).await?.is_none() {
        return Ok(None);
    }
    let key = MeasurementKey {
        benchmark_id: benchmark.id,
        executable_id,
        environment_id: environment.id,
        revision_id,
    };
    let Some(measurement) = results::get_result(conn, &key).await? else {
        return Ok(None);
    };

    let longest = branches
        .values()
        .flat_map(|by_exe| by_exe.values())
        .max_by_key(|points| points.len());
    let Some(points) = longest else {
        return Ok(None);
    };
    let (Some(newest), Some(oldest)) = (points.first(), points.last()) else {
        return Ok(None);
    };
    Ok(Some([
        BaselinePoint {
            date: oldest.date,
            value: measurement.value,
        },
        BaselinePoint {
            date: newest.date,
            value: measurement.value,
        },
    ]))
}
