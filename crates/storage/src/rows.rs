//! Raw table rows and their conversion into domain types.

use crate::{Result, StorageError};
use benchwatch_core::model::{
    Benchmark, Branch, Environment, Executable, Measurement, MeasurementKey, Project, Quartiles,
    Report, ReportKey, Revision,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

fn corrupt(table: &'static str, err: benchwatch_core::Error) -> StorageError {
    StorageError::Corrupt {
        table,
        message: err.to_string(),
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub repo_type: String,
    pub repo_path: String,
    pub repo_user: String,
    pub commit_browsing_url: String,
    pub track: bool,
    pub default_branch: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StorageError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            id: row.id,
            name: row.name,
            repo_type: row.repo_type.parse().map_err(|e| corrupt("projects", e))?,
            repo_path: row.repo_path,
            repo_user: row.repo_user,
            commit_browsing_url: row.commit_browsing_url,
            track: row.track,
            default_branch: row.default_branch,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BranchRow {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            id: row.id,
            name: row.name,
            project_id: row.project_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RevisionRow {
    pub id: i64,
    pub commitid: String,
    pub tag: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub author: String,
    pub branch_id: i64,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Revision {
            id: row.id,
            commitid: row.commitid,
            tag: row.tag,
            date: row.date,
            message: row.message,
            author: row.author,
            branch_id: row.branch_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ExecutableRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub project_id: i64,
}

impl From<ExecutableRow> for Executable {
    fn from(row: ExecutableRow) -> Self {
        Executable {
            id: row.id,
            name: row.name,
            description: row.description,
            project_id: row.project_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EnvironmentRow {
    pub id: i64,
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub os: String,
    pub kernel: String,
}

impl From<EnvironmentRow> for Environment {
    fn from(row: EnvironmentRow) -> Self {
        Environment {
            id: row.id,
            name: row.name,
            cpu: row.cpu,
            memory: row.memory,
            os: row.os,
            kernel: row.kernel,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BenchmarkRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub benchmark_type: String,
    pub data_type: String,
    pub units_title: String,
    pub units: String,
    pub lessisbetter: bool,
    pub default_on_comparison: bool,
}

impl TryFrom<BenchmarkRow> for Benchmark {
    type Error = StorageError;

    fn try_from(row: BenchmarkRow) -> Result<Self> {
        Ok(Benchmark {
            id: row.id,
            name: row.name,
            description: row.description,
            benchmark_type: row
                .benchmark_type
                .parse()
                .map_err(|e| corrupt("benchmarks", e))?,
            data_type: row.data_type.parse().map_err(|e| corrupt("benchmarks", e))?,
            units_title: row.units_title,
            units: row.units,
            lessisbetter: row.lessisbetter,
            default_on_comparison: row.default_on_comparison,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ResultRow {
    pub id: i64,
    pub value: f64,
    pub std_dev: Option<f64>,
    pub val_min: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub val_max: Option<f64>,
    pub date: DateTime<Utc>,
    pub revision_id: i64,
    pub executable_id: i64,
    pub benchmark_id: i64,
    pub environment_id: i64,
}

impl From<ResultRow> for Measurement {
    fn from(row: ResultRow) -> Self {
        let quartiles = match (row.val_min, row.q1, row.q3, row.val_max) {
            (Some(min), Some(q1), Some(q3), Some(max)) => Some(Quartiles { min, q1, q3, max }),
            _ => None,
        };
        Measurement {
            id: row.id,
            key: MeasurementKey {
                benchmark_id: row.benchmark_id,
                executable_id: row.executable_id,
                environment_id: row.environment_id,
                revision_id: row.revision_id,
            },
            value: row.value,
            std_dev: row.std_dev,
            quartiles,
            date: row.date,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReportRow {
    pub id: i64,
    pub revision_id: i64,
    pub environment_id: i64,
    pub executable_id: i64,
    pub colorcode: String,
    pub item_description: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = StorageError;

    fn try_from(row: ReportRow) -> Result<Self> {
        Ok(Report {
            id: row.id,
            key: ReportKey {
                executable_id: row.executable_id,
                environment_id: row.environment_id,
                revision_id: row.revision_id,
            },
            colorcode: row.colorcode.parse().map_err(|e| corrupt("reports", e))?,
            item_description: row.item_description,
        })
    }
}

/// A result joined with its benchmark and revision, as read by the
/// changes table and timelines.
#[derive(Debug, FromRow)]
pub(crate) struct JoinedResultRow {
    #[sqlx(flatten)]
    pub result: ResultRow,
    pub b_name: String,
    pub b_description: String,
    pub b_benchmark_type: String,
    pub b_data_type: String,
    pub b_units_title: String,
    pub b_units: String,
    pub b_lessisbetter: bool,
    pub b_default_on_comparison: bool,
}

impl JoinedResultRow {
    pub fn split(self) -> Result<(Benchmark, Measurement)> {
        let benchmark = Benchmark::try_from(BenchmarkRow {
            id: self.result.benchmark_id,
            name: self.b_name,
            description: self.b_description,
            benchmark_type: self.b_benchmark_type,
            data_type: self.b_data_type,
            units_title: self.b_units_title,
            units: self.b_units,
            lessisbetter: self.b_lessisbetter,
            default_on_comparison: self.b_default_on_comparison,
        })?;
        Ok((benchmark, self.result.into()))
    }
}
