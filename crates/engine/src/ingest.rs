// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result ingestion.
//!
//! A submission is validated, its dimensions are resolved (or created where
//! [`IngestConfig`] allows it) and one result is written, all inside one
//! transaction. Work that talks to the commit-log collaborator runs after
//! the commit, so a remote failure can only add a warning.
//!
//! [`IngestConfig`]: benchwatch_core::IngestConfig

use crate::{metric_names, Engine};
use benchwatch_core::model::{NewMeasurement, Project, RepoType, Report, ReportKey, Revision};
use benchwatch_core::{Error, MeasurementKey, Result, ResultPayload, ValidatedResult};
use benchwatch_storage::{dimensions, results, revisions, SqliteConnection, StorageError};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of a single saved result.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub key: ReportKey,
    /// Report materialised by this submission, if the policy allowed it.
    pub report: Option<Report>,
    pub warnings: Vec<String>,
}

/// Outcome of a saved batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub saved: usize,
    pub reports: Vec<Report>,
    pub warnings: Vec<String>,
}

/// A batch that was rolled back.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct BatchError {
    /// Position of the offending item, `None` when the failure was not
    /// caused by a particular item.
    pub index: Option<usize>,
    #[source]
    pub source: Error,
}

impl BatchError {
    fn at(index: usize, source: Error) -> Self {
        Self {
            index: Some(index),
            source,
        }
    }

    fn whole(source: impl Into<Error>) -> Self {
        Self {
            index: None,
            source: source.into(),
        }
    }
}

/// A revision seen for the first time while ingesting.
struct NewRevision {
    project: Project,
    revision: Revision,
}

struct Stored {
    key: ReportKey,
    new_revision: Option<NewRevision>,
}

impl Engine {
    /// Validate and store one submission, then materialise its report when
    /// enough data is present.
    ///
    /// `update_repo` asks the commit-log collaborator to synchronise the
    /// project's repository before looking up a new revision.
    pub async fn save_result(&self, payload: &ResultPayload, update_repo: bool) -> Result<SaveOutcome> {
        let stored = match self.save_in_transaction(payload).await {
            Ok(stored) => stored,
            Err(err) => {
                metrics::counter!(metric_names::INGEST_FAILURES).increment(1);
                warn!(error = %err, "Could not save result");
                return Err(err);
            }
        };
        metrics::counter!(metric_names::RESULTS_INGESTED).increment(1);

        let mut warnings = Vec::new();
        if let Some(new) = &stored.new_revision {
            self.fetch_revision_info(new, update_repo, &mut warnings).await;
        }
        let report = self.report_after_ingest(&stored.key, &mut warnings).await;

        Ok(SaveOutcome {
            key: stored.key,
            report,
            warnings,
        })
    }

    async fn save_in_transaction(&self, payload: &ResultPayload) -> Result<Stored> {
        let validated = payload.validate()?;
        let mut tx = self.db.begin_immediate().await?;
        let stored = self.store(&mut *tx, &validated).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(stored)
    }

    /// Store an ordered list of submissions atomically.
    ///
    /// The first failing item rolls back the whole batch and is reported by
    /// position. Reports are considered once per distinct key after the
    /// batch committed.
    pub async fn ingest_batch(&self, payloads: &[ResultPayload]) -> std::result::Result<BatchOutcome, BatchError> {
        info!(entries = payloads.len(), "Ingesting result batch");

        let outcome = self.ingest_batch_in_transaction(payloads).await;
        let (keys, new_revisions) = match outcome {
            Ok(stored) => stored,
            Err(err) => {
                metrics::counter!(metric_names::INGEST_FAILURES).increment(1);
                warn!(index = ?err.index, error = %err.source, "Result batch rolled back");
                return Err(err);
            }
        };
        metrics::counter!(metric_names::RESULTS_INGESTED).increment(payloads.len() as u64);

        let mut outcome = BatchOutcome {
            saved: payloads.len(),
            ..Default::default()
        };
        for (i, new) in new_revisions.iter().enumerate() {
            self.fetch_revision_info(new, i == 0, &mut outcome.warnings).await;
        }
        for key in &keys {
            if let Some(report) = self.report_after_ingest(key, &mut outcome.warnings).await {
                outcome.reports.push(report);
            }
        }

        debug!(saved = outcome.saved, reports = outcome.reports.len(), "Result batch completed");
        Ok(outcome)
    }

    async fn ingest_batch_in_transaction(
        &self,
        payloads: &[ResultPayload],
    ) -> std::result::Result<(BTreeSet<ReportKey>, Vec<NewRevision>), BatchError> {
        if payloads.is_empty() {
            return Err(BatchError::whole(Error::validation("No results in request")));
        }

        let mut tx = self.db.begin_immediate().await.map_err(BatchError::whole)?;
        let mut keys = BTreeSet::new();
        let mut new_revisions = Vec::new();

        for (index, payload) in payloads.iter().enumerate() {
            debug!(index, "Saving batch item");
            let validated = payload.validate().map_err(|e| BatchError::at(index, e))?;
            let stored = self
                .store(&mut *tx, &validated)
                .await
                .map_err(|e| BatchError::at(index, e))?;
            keys.insert(stored.key);
            new_revisions.extend(stored.new_revision);
        }

        tx.commit()
            .await
            .map_err(|e| BatchError::whole(StorageError::from(e)))?;
        Ok((keys, new_revisions))
    }

    /// Resolve dimensions and write one result on `conn`.
    async fn store(&self, conn: &mut SqliteConnection, v: &ValidatedResult) -> Result<Stored> {
        let ingest = &self.settings.ingest;
        let now = Utc::now().trunc_subsecs(0);

        let project = match dimensions::find_project(&mut *conn, &v.project).await? {
            Some(project) => project,
            None if ingest.auto_create_projects => {
                let (project, created) = dimensions::get_or_create_project(&mut *conn, &v.project).await?;
                if created {
                    info!(project = %project.name, "Created project");
                }
                project
            }
            None => {
                return Err(Error::reference(format!("Project '{}' does not exist", v.project)));
            }
        };

        let (branch, _) = dimensions::get_or_create_branch(&mut *conn, project.id, &v.branch).await?;

        let executable = match dimensions::find_executable(&mut *conn, project.id, &v.executable).await? {
            Some(executable) => executable,
            None if ingest.auto_create_executables => {
                dimensions::get_or_create_executable(&mut *conn, project.id, &v.executable)
                    .await?
                    .0
            }
            None => {
                return Err(Error::reference(format!(
                    "Executable '{}' of project '{}' does not exist",
                    v.executable, v.project
                )));
            }
        };

        let environment = dimensions::find_environment(&mut *conn, &v.environment)
            .await?
            .ok_or_else(|| Error::reference(format!("Environment '{}' not found", v.environment)))?;

        let benchmark = match dimensions::find_benchmark(&mut *conn, &v.benchmark.name).await? {
            Some(benchmark) => benchmark,
            None if ingest.auto_create_benchmarks => {
                let (benchmark, created) = dimensions::get_or_create_benchmark(&mut *conn, &v.benchmark).await?;
                if created {
                    info!(benchmark = %benchmark.name, "Created benchmark");
                }
                benchmark
            }
            None => {
                return Err(Error::reference(format!(
                    "Benchmark '{}' does not exist",
                    v.benchmark.name
                )));
            }
        };

        let (revision, revision_created) = revisions::get_or_create_revision(
            &mut *conn,
            branch.id,
            &v.commitid,
            v.revision_date.unwrap_or(now),
        )
        .await?;

        let key = MeasurementKey {
            benchmark_id: benchmark.id,
            executable_id: executable.id,
            environment_id: environment.id,
            revision_id: revision.id,
        };
        results::upsert_result(
            &mut *conn,
            &NewMeasurement {
                key,
                value: v.value,
                std_dev: v.std_dev,
                quartiles: v.quartiles,
                date: v.result_date.unwrap_or(now),
            },
        )
        .await?;

        debug!(
            benchmark = %benchmark.name,
            executable = %executable.name,
            environment = %environment.name,
            commitid = %revision.commitid,
            value = v.value,
            "Result saved"
        );

        Ok(Stored {
            key: key.report_key(),
            new_revision: revision_created.then(|| NewRevision { project, revision }),
        })
    }

    /// Fill in author and message of a new revision from the commit log.
    async fn fetch_revision_info(&self, new: &NewRevision, update_repo: bool, warnings: &mut Vec<String>) {
        if new.project.repo_type == RepoType::None {
            return;
        }

        if update_repo {
            if let Err(err) = self.commits.update_repo(&new.project).await {
                metrics::counter!(metric_names::COMMIT_LOOKUP_FAILURES).increment(1);
                warn!(project = %new.project.name, error = %err, "Repository update failed");
                warnings.push(format!("Could not update repository of '{}': {}", new.project.name, err));
            }
        }

        let logs = match self
            .commits
            .get_logs(&new.project, &new.revision, &new.revision)
            .await
        {
            Ok(logs) => logs,
            Err(err) => {
                metrics::counter!(metric_names::COMMIT_LOOKUP_FAILURES).increment(1);
                warn!(commitid = %new.revision.commitid, error = %err, "Commit lookup failed");
                warnings.push(format!(
                    "Could not fetch commit info for '{}': {}",
                    new.revision.commitid, err
                ));
                return;
            }
        };

        let Some(log) = logs.into_iter().find(|l| l.commitid == new.revision.commitid) else {
            warnings.push(format!("No commit info found for '{}'", new.revision.commitid));
            return;
        };

        if let Err(err) = self.store_commit_info(&new.revision, &log.author, &log.message).await {
            warn!(commitid = %new.revision.commitid, error = %err, "Could not store commit info");
            warnings.push(format!("Could not store commit info for '{}': {}", new.revision.commitid, err));
        }
    }

    async fn store_commit_info(&self, revision: &Revision, author: &str, message: &str) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        revisions::update_commit_info(&mut conn, revision.id, author, message).await?;
        Ok(())
    }

    /// Report creation after a committed ingest. Failures are logged and
    /// returned as warnings since the results themselves are already saved.
    async fn report_after_ingest(&self, key: &ReportKey, warnings: &mut Vec<String>) -> Option<Report> {
        match self.create_report_if_enough_data(key).await {
            Ok(report) => report,
            Err(err) => {
                warn!(?key, error = %err, "Report creation failed");
                warnings.push(format!("Could not create report: {}", err));
                None
            }
        }
    }

    /// Materialise the report for `key` when the reporting policy is met.
    ///
    /// The project must be tracked, the revision's branch must hold an
    /// earlier revision, and `key` must have at least as many results as
    /// [`ReportPolicy::required`] demands given the earlier revision's count.
    ///
    /// [`ReportPolicy::required`]: benchwatch_core::ReportPolicy::required
    pub async fn create_report_if_enough_data(&self, key: &ReportKey) -> Result<Option<Report>> {
        let mut conn = self.db.acquire().await?;

        let revision = revisions::get_revision(&mut conn, key.revision_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Revision {} not found", key.revision_id)))?;
        let branch = dimensions::get_branch(&mut conn, revision.branch_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Branch {} not found", revision.branch_id)))?;
        let project = dimensions::get_project(&mut conn, branch.project_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Project {} not found", branch.project_id)))?;

        if !project.track {
            debug!(project = %project.name, "Project not tracked, no report");
            return Ok(None);
        }

        let Some(previous) = revisions::previous_revision(&mut conn, &revision).await? else {
            debug!(commitid = %revision.commitid, "First revision of branch, no report");
            return Ok(None);
        };

        let known = results::count_results(
            &mut conn,
            &ReportKey {
                revision_id: previous.id,
                ..*key
            },
        )
        .await?;
        let present = results::count_results(&mut conn, key).await?;
        let required = self.settings.report.required(known);
        if present < required {
            debug!(present, required, "Not enough results for a report yet");
            return Ok(None);
        }

        let (report, _) = self.get_or_create_report_on(&mut conn, key).await?;
        Ok(Some(report))
    }
}
