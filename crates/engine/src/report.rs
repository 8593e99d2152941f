// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Changes tables and report materialisation.

use crate::{metric_names, Engine};
use benchwatch_core::changes::{sort_rows, summarize, ChangeRow};
use benchwatch_core::model::{Environment, Executable, Report, ReportKey, Revision, RowId};
use benchwatch_core::trend::{analyze, BenchmarkTraits};
use benchwatch_core::{Error, Result, TrendConfig};
use benchwatch_storage::{dimensions, reports, results, revisions, ReportListing, SqliteConnection};
use serde::Serialize;
use tracing::{debug, info};

/// Maximum number of candidate revisions considered for a commit prefix.
const PREFIX_CANDIDATES: i64 = 20;

/// Rows sharing a unit, in table order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitsGroup {
    pub units_title: String,
    pub units: String,
    pub lessisbetter: bool,
    pub rows: Vec<ChangeRow>,
    /// Mean percent change of the rows that have one.
    pub average_change: Option<f64>,
}

/// A revision adjacent to the one shown, with its stored report text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbour {
    pub description: String,
    pub commitid: String,
    pub short_commitid: String,
    pub summary: String,
}

/// The changes of one revision for one executable and environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangesTable {
    pub revision: Revision,
    pub executable: Executable,
    pub environment: Environment,
    pub trend_window: usize,
    pub groups: Vec<UnitsGroup>,
    pub previous: Option<Neighbour>,
    pub next: Option<Neighbour>,
    pub report: Report,
}

impl ChangesTable {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ChangeRow> {
        self.groups.iter().flat_map(|g| g.rows.iter())
    }
}

/// Latest reports, all and significant only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportListings {
    pub latest: Vec<ReportListing>,
    pub significant: Vec<ReportListing>,
}

/// Classify every result of `key` against its history on the revision's
/// branch.
pub(crate) async fn compute_rows(
    conn: &mut SqliteConnection,
    key: &ReportKey,
    revision: &Revision,
    config: &TrendConfig,
) -> Result<Vec<ChangeRow>> {
    let stored = results::revision_results(&mut *conn, key).await?;
    let mut rows = Vec::with_capacity(stored.len());

    for (benchmark, measurement) in stored {
        let history = results::history(
            &mut *conn,
            &measurement.key,
            revision.branch_id,
            revision.date,
            config.trend_window,
        )
        .await?;
        let traits = BenchmarkTraits {
            data_type: benchmark.data_type,
            lessisbetter: benchmark.lessisbetter,
        };
        let outcome = analyze(config, traits, measurement.value, &history);
        rows.push(ChangeRow::new(&benchmark, measurement.value, measurement.std_dev, outcome));
    }

    sort_rows(&mut rows);
    Ok(rows)
}

/// Split sorted rows into per-unit groups.
pub(crate) fn group_rows(rows: Vec<ChangeRow>) -> Vec<UnitsGroup> {
    let mut groups: Vec<UnitsGroup> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(g) if g.units_title == row.units_title && g.units == row.units => g.rows.push(row),
            _ => groups.push(UnitsGroup {
                units_title: row.units_title.clone(),
                units: row.units.clone(),
                lessisbetter: row.lessisbetter,
                rows: vec![row],
                average_change: None,
            }),
        }
    }
    for group in &mut groups {
        let changes: Vec<f64> = group.rows.iter().filter_map(|r| r.percent_change).collect();
        if !changes.is_empty() {
            group.average_change = Some(changes.iter().sum::<f64>() / changes.len() as f64);
        }
    }
    groups
}

impl Engine {
    /// Changes of the revision matching `commit` (a full id or a prefix) for
    /// one executable and environment, classified with `trend_window`
    /// earlier results (the configured window when `None`).
    ///
    /// The stored report is created if missing but never modified.
    pub async fn changes_table(
        &self,
        executable_id: RowId,
        environment_id: RowId,
        commit: &str,
        trend_window: Option<usize>,
    ) -> Result<ChangesTable> {
        let window = trend_window.unwrap_or(self.settings.analysis.trend_window);
        if window == 0 {
            return Err(Error::validation("Trend window must be at least 1"));
        }
        let config = self.settings.analysis.with_window(window);

        let mut conn = self.db.acquire().await?;
        let executable = dimensions::get_executable(&mut conn, executable_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Executable {} not found", executable_id)))?;
        let environment = dimensions::get_environment(&mut conn, environment_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Environment {} not found", environment_id)))?;
        let revision = resolve_commit(&mut conn, executable.project_id, commit).await?;

        let key = ReportKey {
            executable_id,
            environment_id,
            revision_id: revision.id,
        };
        let previous = match revisions::previous_revision(&mut conn, &revision).await? {
            Some(rev) => Some(neighbour(&mut conn, &key, rev).await?),
            None => None,
        };
        let next = match revisions::next_revision(&mut conn, &revision).await? {
            Some(rev) => Some(neighbour(&mut conn, &key, rev).await?),
            None => None,
        };

        let (report, _) = self.get_or_create_report_on(&mut conn, &key).await?;
        let rows = compute_rows(&mut conn, &key, &revision, &config).await?;

        debug!(
            executable = %executable.name,
            environment = %environment.name,
            commitid = %revision.commitid,
            rows = rows.len(),
            "Changes table computed"
        );

        Ok(ChangesTable {
            revision,
            executable,
            environment,
            trend_window: window,
            groups: group_rows(rows),
            previous,
            next,
            report,
        })
    }

    /// The stored report for `key`, computing and inserting it first when
    /// absent. Concurrent callers converge on one row.
    pub async fn get_or_create_report(&self, key: &ReportKey) -> Result<(Report, bool)> {
        let mut conn = self.db.acquire().await?;
        self.get_or_create_report_on(&mut conn, key).await
    }

    pub(crate) async fn get_or_create_report_on(
        &self,
        conn: &mut SqliteConnection,
        key: &ReportKey,
    ) -> Result<(Report, bool)> {
        if let Some(report) = reports::find_report(&mut *conn, key).await? {
            return Ok((report, false));
        }

        let revision = revisions::get_revision(&mut *conn, key.revision_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Revision {} not found", key.revision_id)))?;
        let rows = compute_rows(&mut *conn, key, &revision, &self.settings.analysis).await?;
        let summary = summarize(&rows);

        let (report, created) = reports::insert_report_if_absent(&mut *conn, key, &summary).await?;
        if created {
            metrics::counter!(metric_names::REPORTS_CREATED).increment(1);
            info!(
                commitid = %revision.commitid,
                executable_id = key.executable_id,
                environment_id = key.environment_id,
                colorcode = %report.colorcode,
                "Report created"
            );
        }
        Ok((report, created))
    }

    /// Recompute and overwrite the report for `key`, creating it if absent.
    pub async fn refresh_report(&self, key: &ReportKey) -> Result<Report> {
        let mut conn = self.db.acquire().await?;
        self.refresh_report_on(&mut conn, key).await
    }

    async fn refresh_report_on(&self, conn: &mut SqliteConnection, key: &ReportKey) -> Result<Report> {
        let revision = revisions::get_revision(&mut *conn, key.revision_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Revision {} not found", key.revision_id)))?;
        let rows = compute_rows(&mut *conn, key, &revision, &self.settings.analysis).await?;
        let report = reports::upsert_report(&mut *conn, key, &summarize(&rows)).await?;
        info!(
            commitid = %revision.commitid,
            colorcode = %report.colorcode,
            "Report refreshed"
        );
        Ok(report)
    }

    /// Refresh the report of the revision matching `commit` for one
    /// executable and environment.
    pub async fn refresh_report_for_commit(
        &self,
        executable_id: RowId,
        environment_id: RowId,
        commit: &str,
    ) -> Result<Report> {
        let mut conn = self.db.acquire().await?;
        let executable = dimensions::get_executable(&mut conn, executable_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Executable {} not found", executable_id)))?;
        dimensions::get_environment(&mut conn, environment_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Environment {} not found", environment_id)))?;
        let revision = resolve_commit(&mut conn, executable.project_id, commit).await?;
        let key = ReportKey {
            executable_id,
            environment_id,
            revision_id: revision.id,
        };
        self.refresh_report_on(&mut conn, &key).await
    }

    /// Refresh every stored report, oldest revision first. Returns how many
    /// were rewritten.
    pub async fn refresh_all_reports(&self) -> Result<usize> {
        let mut conn = self.db.acquire().await?;
        let keys = reports::all_report_keys(&mut conn).await?;
        for key in &keys {
            self.refresh_report_on(&mut conn, key).await?;
        }
        Ok(keys.len())
    }

    /// Latest reports of tracked projects by revision date.
    pub async fn report_listings(&self) -> Result<ReportListings> {
        let limit = self.settings.report.listing_limit;
        let mut conn = self.db.acquire().await?;
        Ok(ReportListings {
            latest: reports::latest_reports(&mut conn, limit, false).await?,
            significant: reports::latest_reports(&mut conn, limit, true).await?,
        })
    }
}

/// Find the revision of `project_id` named by a full commit id or a prefix.
///
/// An exact match wins. Otherwise the prefix must name a single commit; if
/// that commit exists on several branches the newest revision is used.
async fn resolve_commit(conn: &mut SqliteConnection, project_id: RowId, commit: &str) -> Result<Revision> {
    let commit = commit.trim();
    if commit.is_empty() {
        return Err(Error::validation("No revision given"));
    }

    let candidates = revisions::find_by_commit_prefix(conn, project_id, commit, PREFIX_CANDIDATES).await?;
    if let Some(exact) = candidates.iter().find(|r| r.commitid == commit) {
        return Ok(exact.clone());
    }

    let mut commits: Vec<&str> = candidates.iter().map(|r| r.commitid.as_str()).collect();
    commits.sort_unstable();
    commits.dedup();
    match commits.len() {
        0 => Err(Error::not_found(format!("Revision '{}' not found", commit))),
        1 => Ok(candidates[0].clone()),
        _ => Err(Error::validation(format!(
            "Revision '{}' is ambiguous, it matches {} commits",
            commit,
            commits.len()
        ))),
    }
}

async fn neighbour(conn: &mut SqliteConnection, key: &ReportKey, revision: Revision) -> Result<Neighbour> {
    let neighbour_key = ReportKey {
        revision_id: revision.id,
        ..*key
    };
    let summary = reports::find_report(conn, &neighbour_key)
        .await?
        .map(|r| r.item_description)
        .unwrap_or_default();
    Ok(Neighbour {
        description: revision.to_string(),
        short_commitid: revision.short_commitid().to_string(),
        commitid: revision.commitid,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, file_engine, payload, register_executable};
    use benchwatch_core::model::Colorcode;
    use benchwatch_core::payload::Scalar;
    use benchwatch_core::Classification;

    /// Revisions c1..c3 with `float` at 100, 100, 104 and `items` (more is
    /// better) at 50, 50, 45.
    async fn seeded() -> Engine {
        let engine = engine().await;
        register_executable(&engine).await;
        for (commit, day, float, items) in [("c1aa", 1, 100.0, 50.0), ("c2bb", 2, 100.0, 50.0), ("c3cc", 3, 104.0, 45.0)] {
            let mut more = payload(commit, day, "items", items);
            more.lessisbetter = Some(Scalar::Bool(false));
            more.units = Some(Scalar::Text("items/s".to_string()));
            more.units_title = Some(Scalar::Text("Throughput".to_string()));
            engine
                .ingest_batch(&[payload(commit, day, "float", float), more])
                .await
                .unwrap();
        }
        engine
    }

    #[tokio::test]
    async fn test_changes_table_rows_and_neighbours() {
        let engine = seeded().await;
        let table = engine.changes_table(1, 1, "c2b", None).await.unwrap();

        assert_eq!(table.revision.commitid, "c2bb");
        assert_eq!(table.groups.len(), 2);
        assert_eq!(table.groups[0].units_title, "Throughput");
        assert_eq!(table.groups[1].units_title, "Time");
        assert!(table.rows().all(|r| r.classification == Classification::NoChange));

        let previous = table.previous.unwrap();
        assert_eq!(previous.commitid, "c1aa");
        let next = table.next.unwrap();
        assert_eq!(next.commitid, "c3cc");
        assert!(next.summary.contains("float: +4.00% regression"));
    }

    #[tokio::test]
    async fn test_changes_table_classifies_against_window() {
        let engine = seeded().await;
        let table = engine.changes_table(1, 1, "c3cc", Some(5)).await.unwrap();
        assert_eq!(table.trend_window, 5);

        let rows: Vec<_> = table.rows().collect();
        let items = rows.iter().find(|r| r.benchmark == "items").unwrap();
        // 50 -> 45 on a more-is-better benchmark is 10% worse.
        assert_eq!(items.classification, Classification::Regression);
        assert_eq!(items.delta, "+10.00%");
        let float = rows.iter().find(|r| r.benchmark == "float").unwrap();
        assert_eq!(float.old_value, Some(100.0));
        assert_eq!(table.report.colorcode, Colorcode::Red);
    }

    #[tokio::test]
    async fn test_changes_table_is_deterministic() {
        let engine = seeded().await;
        let a = engine.changes_table(1, 1, "c3cc", None).await.unwrap();
        let b = engine.changes_table(1, 1, "c3cc", None).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_and_ambiguous_commits() {
        let engine = seeded().await;
        let err = engine.changes_table(1, 1, "zzz", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = engine.changes_table(1, 1, "c", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = engine.changes_table(99, 1, "c1aa", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_or_create_keeps_existing_until_refresh() {
        let engine = seeded().await;
        let table = engine.changes_table(1, 1, "c3cc", None).await.unwrap();
        let key = ReportKey {
            executable_id: 1,
            environment_id: 1,
            revision_id: table.revision.id,
        };

        // Later history changes do not touch the stored report.
        engine
            .save_result(&payload("c2bb", 2, "float", 104.0), false)
            .await
            .unwrap();
        let (stored, created) = engine.get_or_create_report(&key).await.unwrap();
        assert!(!created);
        assert_eq!(stored, table.report);

        let refreshed = engine.refresh_report(&key).await.unwrap();
        assert_eq!(refreshed.id, stored.id);
        assert!(!refreshed.item_description.contains("float"));
        assert_eq!(engine.refresh_all_reports().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_report() {
        let dir = tempfile::tempdir().unwrap();
        let engine = file_engine(&dir).await;
        engine.save_result(&payload("c1", 1, "float", 100.0), false).await.unwrap();
        let saved = engine.save_result(&payload("c2", 2, "float", 104.0), false).await.unwrap();
        // Start from a revision without a report.
        sqlx::query("DELETE FROM reports")
            .execute(engine.database().pool())
            .await
            .unwrap();
        let key = saved.key;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        engine.get_or_create_report(&key).await
                    } else {
                        engine
                            .create_report_if_enough_data(&key)
                            .await
                            .map(|report| (report.expect("policy is met"), false))
                    }
                })
            })
            .collect();

        let mut reports = Vec::new();
        for task in tasks {
            reports.push(task.await.unwrap().unwrap().0);
        }

        assert!(reports.iter().all(|r| r.id == reports[0].id));
        assert_eq!(reports[0].colorcode, Colorcode::Red);
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports")
            .fetch_one(engine.database().pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_listings() {
        let engine = seeded().await;
        let listings = engine.report_listings().await.unwrap();
        assert_eq!(listings.latest.len(), 2);
        assert_eq!(listings.latest[0].commitid, "c3cc");
        assert_eq!(listings.significant.len(), 1);
    }

    #[test]
    fn test_group_average() {
        let row = |name: &str, units_title: &str, pct: Option<f64>| ChangeRow {
            benchmark_id: 1,
            benchmark: name.to_string(),
            units_title: units_title.to_string(),
            units: "s".to_string(),
            lessisbetter: true,
            old_value: None,
            new_value: 1.0,
            std_dev: None,
            percent_change: pct,
            delta: String::new(),
            classification: Classification::NoChange,
        };
        let groups = group_rows(vec![
            row("a", "Time", Some(2.0)),
            row("b", "Time", Some(4.0)),
            row("c", "Time", None),
            row("d", "Zeta", None),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].average_change, Some(3.0));
        assert_eq!(groups[1].average_change, None);
    }
}
