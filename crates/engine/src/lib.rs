// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! The benchwatch results engine.
//!
//! [`Engine`] ties storage, the commit-log collaborator and settings
//! together. Its operations are spread over modules by concern:
//!
//! - [`ingest`] - saving submitted results and deciding when to report
//! - [`report`] - changes tables and report materialisation
//! - [`timeline`] - paged timeline series
//! - [`comparison`] - latest values across executables and environments
//! - [`logs`] - commit logs around a revision
//!
//! Every operation that touches the database checks out at most one
//! connection at a time, so the engine also works against a single
//! connection in-memory database.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod comparison;
pub mod ingest;
pub mod logs;
pub mod report;
pub mod timeline;

use benchwatch_adapters::CommitLog;
use benchwatch_core::Settings;
use benchwatch_storage::Database;
use std::sync::Arc;

pub use comparison::ComparisonData;
pub use ingest::{BatchError, BatchOutcome, SaveOutcome};
pub use logs::{CommitLogEntry, CommitLogView};
pub use report::{ChangesTable, Neighbour, ReportListings, UnitsGroup};
pub use timeline::{BenchmarkSelection, Timeline, TimelinePager, TimelineQuery, TimelineTrailer};

/// Metric names recorded by the engine.
pub mod metric_names {
    pub const RESULTS_INGESTED: &str = "benchwatch_results_ingested_total";
    pub const INGEST_FAILURES: &str = "benchwatch_ingest_failures_total";
    pub const REPORTS_CREATED: &str = "benchwatch_reports_created_total";
    pub const COMMIT_LOOKUP_FAILURES: &str = "benchwatch_commit_lookup_failures_total";
}

/// Shared handle to the results engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    commits: Arc<dyn CommitLog>,
    settings: Arc<Settings>,
}

impl Engine {
    pub fn new(db: Database, commits: Arc<dyn CommitLog>, settings: Settings) -> Self {
        Self {
            db,
            commits,
            settings: Arc::new(settings),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use benchwatch_adapters::{CommitLogError, CommitRecord, NoCommitLog};
    use benchwatch_core::config::DatabaseConfig;
    use benchwatch_core::model::{Project, Revision};
    use benchwatch_core::payload::{ResultPayload, Scalar};
    use benchwatch_storage::dimensions::{self, NewEnvironment};
    use mockall::mock;

    mock! {
        pub Log {}

        #[async_trait]
        impl CommitLog for Log {
            async fn update_repo(&self, project: &Project) -> Result<(), CommitLogError>;
            async fn get_logs(
                &self,
                project: &Project,
                start: &Revision,
                end: &Revision,
            ) -> Result<Vec<CommitRecord>, CommitLogError>;
        }
    }

    /// An engine over a fresh in-memory database with environment
    /// `bench-box` registered.
    pub async fn engine_with(commits: Arc<dyn CommitLog>) -> Engine {
        engine_on(Database::in_memory().await.unwrap(), commits).await
    }

    /// An engine over a database file under `dir` whose pool holds several
    /// connections, with `bench-box`, `MyProject` and `exe` registered.
    pub async fn file_engine(dir: &tempfile::TempDir) -> Engine {
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("bench.db").display()),
            max_connections: 8,
        };
        let db = Database::connect(&config).await.unwrap();
        db.migrate().await.unwrap();
        let engine = engine_on(db, Arc::new(NoCommitLog)).await;
        register_executable(&engine).await;
        engine
    }

    async fn engine_on(db: Database, commits: Arc<dyn CommitLog>) -> Engine {
        let mut conn = db.acquire().await.unwrap();
        dimensions::upsert_environment(&mut conn, &NewEnvironment::named("bench-box"))
            .await
            .unwrap();
        drop(conn);
        Engine::new(db, commits, Settings::default())
    }

    pub async fn engine() -> Engine {
        engine_with(Arc::new(NoCommitLog)).await
    }

    /// Register project `MyProject` with executable `exe`.
    pub async fn register_executable(engine: &Engine) {
        let mut conn = engine.database().acquire().await.unwrap();
        let (project, _) = dimensions::get_or_create_project(&mut conn, "MyProject")
            .await
            .unwrap();
        dimensions::get_or_create_executable(&mut conn, project.id, "exe")
            .await
            .unwrap();
    }

    fn text(s: &str) -> Option<Scalar> {
        Some(Scalar::Text(s.to_string()))
    }

    /// A valid submission for `MyProject`/`master`/`exe`/`bench-box`.
    pub fn payload(commit: &str, day: u32, benchmark: &str, value: f64) -> ResultPayload {
        ResultPayload {
            project: text("MyProject"),
            branch: text("master"),
            commitid: text(commit),
            executable: text("exe"),
            environment: text("bench-box"),
            benchmark: text(benchmark),
            result_value: Some(Scalar::Number(value)),
            revision_date: text(&format!("2024-01-{:02} 12:00:00", day)),
            ..Default::default()
        }
    }
}
