//! Change reports, one per (revision, executable, environment).

use crate::rows::ReportRow;
use crate::{Result, StorageError};
use benchwatch_core::changes::ReportSummary;
use benchwatch_core::model::{Report, ReportKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

pub async fn find_report(conn: &mut SqliteConnection, key: &ReportKey) -> Result<Option<Report>> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, revision_id, environment_id, executable_id, colorcode, item_description \
         FROM reports WHERE revision_id = ? AND executable_id = ? AND environment_id = ?",
    )
    .bind(key.revision_id)
    .bind(key.executable_id)
    .bind(key.environment_id)
    .fetch_optional(conn)
    .await?
    .map(Report::try_from)
    .transpose()
}

/// Store `summary` for `key` unless a report already exists.
///
/// An existing report is returned untouched. The flag is true when this
/// call inserted the row.
pub async fn insert_report_if_absent(
    conn: &mut SqliteConnection,
    key: &ReportKey,
    summary: &ReportSummary,
) -> Result<(Report, bool)> {
    let inserted = sqlx::query(
        "INSERT INTO reports (revision_id, environment_id, executable_id, colorcode, item_description) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (revision_id, executable_id, environment_id) DO NOTHING",
    )
    .bind(key.revision_id)
    .bind(key.environment_id)
    .bind(key.executable_id)
    .bind(summary.colorcode.as_str())
    .bind(&summary.item_description)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;
    let report = find_report(conn, key)
        .await?
        .ok_or(StorageError::Database(sqlx::Error::RowNotFound))?;
    Ok((report, inserted))
}

/// Store `summary` for `key`, replacing any earlier summary.
pub async fn upsert_report(
    conn: &mut SqliteConnection,
    key: &ReportKey,
    summary: &ReportSummary,
) -> Result<Report> {
    sqlx::query(
        "INSERT INTO reports (revision_id, environment_id, executable_id, colorcode, item_description) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (revision_id, executable_id, environment_id) DO UPDATE SET \
           colorcode = excluded.colorcode, \
           item_description = excluded.item_description",
    )
    .bind(key.revision_id)
    .bind(key.environment_id)
    .bind(key.executable_id)
    .bind(summary.colorcode.as_str())
    .bind(&summary.item_description)
    .execute(&mut *conn)
    .await?;
    find_report(conn, key)
        .await?
        .ok_or(StorageError::Database(sqlx::Error::RowNotFound))
}

/// Every stored report key, oldest revision first.
pub async fn all_report_keys(conn: &mut SqliteConnection) -> Result<Vec<ReportKey>> {
    let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT rep.executable_id, rep.environment_id, rep.revision_id \
         FROM reports rep JOIN revisions rev ON rev.id = rep.revision_id \
         ORDER BY rev.date, rep.id",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(executable_id, environment_id, revision_id)| ReportKey {
            executable_id,
            environment_id,
            revision_id,
        })
        .collect())
}

/// A report with the names needed to list it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportListing {
    pub report: Report,
    pub project: String,
    pub branch: String,
    pub commitid: String,
    pub revision_date: DateTime<Utc>,
    pub executable: String,
    pub environment: String,
}

#[derive(FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    report: ReportRow,
    project: String,
    branch: String,
    commitid: String,
    revision_date: DateTime<Utc>,
    executable: String,
    environment: String,
}

/// The newest `limit` reports of tracked projects, by revision date.
///
/// With `significant_only`, reports with no colour are skipped.
pub async fn latest_reports(
    conn: &mut SqliteConnection,
    limit: usize,
    significant_only: bool,
) -> Result<Vec<ReportListing>> {
    let rows = sqlx::query_as::<_, ListingRow>(
        "SELECT rep.id, rep.revision_id, rep.environment_id, rep.executable_id, \
                rep.colorcode, rep.item_description, \
                p.name AS project, b.name AS branch, rev.commitid AS commitid, \
                rev.date AS revision_date, exe.name AS executable, env.name AS environment \
         FROM reports rep \
         JOIN revisions rev ON rev.id = rep.revision_id \
         JOIN branches b ON b.id = rev.branch_id \
         JOIN projects p ON p.id = b.project_id \
         JOIN executables exe ON exe.id = rep.executable_id \
         JOIN environments env ON env.id = rep.environment_id \
         WHERE p.track = 1 AND (? = 0 OR rep.colorcode <> 'none') \
         ORDER BY rev.date DESC, rep.id DESC \
         LIMIT ?",
    )
    .bind(significant_only)
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(ReportListing {
                report: Report::try_from(row.report)?,
                project: row.project,
                branch: row.branch,
                commitid: row.commitid,
                revision_date: row.revision_date,
                executable: row.executable,
                environment: row.environment,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{file_database, fixture, fixture_on, revision};
    use benchwatch_core::model::Colorcode;

    fn summary(colorcode: Colorcode, text: &str) -> ReportSummary {
        ReportSummary {
            colorcode,
            item_description: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_summary_wins_until_refreshed() {
        let fx = fixture().await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = ReportKey {
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };
        let mut conn = fx.db.acquire().await.unwrap();

        let (first, created) = insert_report_if_absent(&mut conn, &key, &summary(Colorcode::Red, "a"))
            .await
            .unwrap();
        assert!(created);
        let (second, created) =
            insert_report_if_absent(&mut conn, &key, &summary(Colorcode::Green, "b"))
                .await
                .unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let refreshed = upsert_report(&mut conn, &key, &summary(Colorcode::Green, "b"))
            .await
            .unwrap();
        assert_eq!(refreshed.id, first.id);
        assert_eq!(refreshed.colorcode, Colorcode::Green);
        assert_eq!(all_report_keys(&mut conn).await.unwrap(), vec![key]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_one_report() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture_on(file_database(&dir).await).await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = ReportKey {
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let db = fx.db.clone();
                tokio::spawn(async move {
                    let mut conn = db.acquire().await.unwrap();
                    let text = format!("writer {}", i);
                    insert_report_if_absent(&mut conn, &key, &summary(Colorcode::None, &text)).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created = 0;
        for task in tasks {
            let (report, inserted) = task.await.unwrap().unwrap();
            ids.push(report.id);
            created += usize::from(inserted);
        }

        assert_eq!(created, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        let mut conn = fx.db.acquire().await.unwrap();
        assert_eq!(all_report_keys(&mut conn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_filters_insignificant_reports() {
        let fx = fixture().await;
        let quiet = revision(&fx.db, &fx.branch, "quiet", 1).await;
        let loud = revision(&fx.db, &fx.branch, "loud", 2).await;
        let mut conn = fx.db.acquire().await.unwrap();
        for (rev, color) in [(&quiet, Colorcode::None), (&loud, Colorcode::Red)] {
            let key = ReportKey {
                executable_id: fx.executable.id,
                environment_id: fx.environment.id,
                revision_id: rev.id,
            };
            insert_report_if_absent(&mut conn, &key, &summary(color, ""))
                .await
                .unwrap();
        }

        let all = latest_reports(&mut conn, 10, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].commitid, "loud");
        assert_eq!(all[0].project, "MyProject");
        assert_eq!(all[0].environment, "bench-box");

        let significant = latest_reports(&mut conn, 10, true).await.unwrap();
        assert_eq!(significant.len(), 1);
        assert_eq!(significant[0].report.colorcode, Colorcode::Red);
    }
}
