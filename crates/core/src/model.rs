// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dimension and fact types of the results database.
//!
//! Dimensions (projects, branches, revisions, executables, environments and
//! benchmarks) identify *what* was measured *where*. A [`Measurement`] is one
//! stored result for a (benchmark, executable, environment, revision) key and a
//! [`Report`] summarises all measurements of one (executable, environment,
//! revision) key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database identifier of any row.
pub type RowId = i64;

/// Number of characters shown for abbreviated commit ids.
pub const SHORT_COMMIT_LEN: usize = 10;

/// Where commit metadata for a project comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RepoType {
    /// No repository configured; commit logs are not available.
    #[default]
    None,
    /// Local git mirror.
    Git,
    /// Local mercurial mirror.
    Mercurial,
    /// GitHub REST API.
    Github,
}

impl RepoType {
    /// Single-letter code stored in the database.
    pub fn code(self) -> &'static str {
        match self {
            Self::None => "N",
            Self::Git => "G",
            Self::Mercurial => "M",
            Self::Github => "H",
        }
    }
}

impl FromStr for RepoType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "N" | "" | "none" => Ok(Self::None),
            "G" | "git" => Ok(Self::Git),
            "M" | "mercurial" => Ok(Self::Mercurial),
            "H" | "github" => Ok(Self::Github),
            other => Err(crate::Error::validation(format!(
                "Unknown repository type '{}'",
                other
            ))),
        }
    }
}

/// A software project whose revisions are benchmarked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RowId,
    pub name: String,
    pub repo_type: RepoType,
    pub repo_path: String,
    pub repo_user: String,
    /// Template expanded with `{commitid}` and `{short_commit_id}`.
    pub commit_browsing_url: String,
    /// Reports are only produced for tracked projects.
    pub track: bool,
    pub default_branch: String,
}

/// A named line of revisions within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: RowId,
    pub name: String,
    pub project_id: RowId,
}

/// A point in source history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RowId,
    pub commitid: String,
    pub tag: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub author: String,
    pub branch_id: RowId,
}

impl Revision {
    /// Abbreviated commit id for display.
    pub fn short_commitid(&self) -> &str {
        short_commitid(&self.commitid)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.date.format("%Y-%m-%d %H:%M"), self.short_commitid())?;
        if !self.tag.is_empty() {
            write!(f, " ({})", self.tag)?;
        }
        Ok(())
    }
}

/// Abbreviate a commit id to [`SHORT_COMMIT_LEN`] characters.
pub fn short_commitid(commitid: &str) -> &str {
    match commitid.char_indices().nth(SHORT_COMMIT_LEN) {
        Some((idx, _)) => &commitid[..idx],
        None => commitid,
    }
}

/// A build of a project that benchmarks run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executable {
    pub id: RowId,
    pub name: String,
    pub description: String,
    pub project_id: RowId,
}

/// A machine configuration benchmarks run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: RowId,
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub os: String,
    pub kernel: String,
}

/// Whether a benchmark reports one value or a sample distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataType {
    /// One value per run, optionally with a standard deviation.
    #[default]
    #[serde(rename = "U")]
    SingleValue,
    /// Many samples per run, summarised by quartiles.
    #[serde(rename = "M")]
    MultiSample,
}

impl DataType {
    /// Single-letter code stored in the database.
    pub fn code(self) -> &'static str {
        match self {
            Self::SingleValue => "U",
            Self::MultiSample => "M",
        }
    }
}

impl FromStr for DataType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "U" => Ok(Self::SingleValue),
            "M" => Ok(Self::MultiSample),
            other => Err(crate::Error::validation(format!(
                "Unknown benchmark data type '{}'",
                other
            ))),
        }
    }
}

/// Whether a benchmark is shared between projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BenchmarkType {
    #[default]
    #[serde(rename = "C")]
    CrossProject,
    #[serde(rename = "O")]
    OwnProject,
}

impl BenchmarkType {
    pub fn code(self) -> &'static str {
        match self {
            Self::CrossProject => "C",
            Self::OwnProject => "O",
        }
    }
}

impl FromStr for BenchmarkType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "C" => Ok(Self::CrossProject),
            "O" => Ok(Self::OwnProject),
            other => Err(crate::Error::validation(format!(
                "Unknown benchmark type '{}'",
                other
            ))),
        }
    }
}

/// A named measurement procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: RowId,
    pub name: String,
    pub description: String,
    pub benchmark_type: BenchmarkType,
    pub data_type: DataType,
    pub units_title: String,
    pub units: String,
    pub lessisbetter: bool,
    pub default_on_comparison: bool,
}

impl Benchmark {
    /// Direction label used by charts.
    pub fn direction_label(&self) -> &'static str {
        if self.lessisbetter {
            " (less is better)"
        } else {
            " (more is better)"
        }
    }
}

/// Attributes used when a benchmark is created on first sight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    pub units_title: String,
    pub units: String,
    pub lessisbetter: bool,
}

impl BenchmarkSpec {
    /// Spec with the stock defaults for everything but the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type: DataType::SingleValue,
            units_title: "Time".to_string(),
            units: "seconds".to_string(),
            lessisbetter: true,
        }
    }
}

/// Distribution summary of a multi-sample result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub min: f64,
    pub q1: f64,
    pub q3: f64,
    pub max: f64,
}

impl Quartiles {
    /// All four statistics collapsed onto one value.
    pub fn flat(value: f64) -> Self {
        Self {
            min: value,
            q1: value,
            q3: value,
            max: value,
        }
    }

    /// `min <= q1 <= q3 <= max`, all finite.
    pub fn is_ordered(&self) -> bool {
        [self.min, self.q1, self.q3, self.max]
            .iter()
            .all(|v| v.is_finite())
            && self.min <= self.q1
            && self.q1 <= self.q3
            && self.q3 <= self.max
    }
}

/// Natural key of a stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementKey {
    pub benchmark_id: RowId,
    pub executable_id: RowId,
    pub environment_id: RowId,
    pub revision_id: RowId,
}

impl MeasurementKey {
    /// The report this measurement contributes to.
    pub fn report_key(&self) -> ReportKey {
        ReportKey {
            executable_id: self.executable_id,
            environment_id: self.environment_id,
            revision_id: self.revision_id,
        }
    }
}

/// One stored benchmark result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: RowId,
    pub key: MeasurementKey,
    pub value: f64,
    pub std_dev: Option<f64>,
    pub quartiles: Option<Quartiles>,
    pub date: DateTime<Utc>,
}

impl Measurement {
    /// Quartiles with missing statistics defaulted to the value.
    pub fn quartiles_or_flat(&self) -> Quartiles {
        self.quartiles.unwrap_or_else(|| Quartiles::flat(self.value))
    }
}

/// A measurement ready to be written at its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub key: MeasurementKey,
    pub value: f64,
    pub std_dev: Option<f64>,
    pub quartiles: Option<Quartiles>,
    pub date: DateTime<Utc>,
}

/// Natural key of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportKey {
    pub executable_id: RowId,
    pub environment_id: RowId,
    pub revision_id: RowId,
}

/// Overall colour of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Colorcode {
    /// At least one regression.
    Red,
    /// At least one improvement and no regression.
    Green,
    /// Nothing significant.
    #[default]
    None,
}

impl Colorcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::None => "none",
        }
    }

    /// Whether the report signals a significant change.
    pub fn is_significant(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Colorcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colorcode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            "none" | "" | "grey" => Ok(Self::None),
            other => Err(crate::Error::validation(format!(
                "Unknown colorcode '{}'",
                other
            ))),
        }
    }
}

/// Materialised per-revision summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: RowId,
    pub key: ReportKey,
    pub colorcode: Colorcode,
    pub item_description: String,
}
