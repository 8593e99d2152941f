//! Benchmark results: writes at the natural key and history reads.

use crate::rows::{JoinedResultRow, ResultRow, RevisionRow};
use crate::Result;
use benchwatch_core::model::{
    Benchmark, Measurement, MeasurementKey, NewMeasurement, ReportKey, Revision, RowId,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;

/// Write `new` at its natural key, replacing any earlier value.
///
/// Concurrent writers to the same key leave exactly one row holding the
/// last write.
pub async fn upsert_result(conn: &mut SqliteConnection, new: &NewMeasurement) -> Result<Measurement> {
    let q = new.quartiles;
    sqlx::query(
        "INSERT INTO results \
           (value, std_dev, val_min, q1, q3, val_max, date, revision_id, executable_id, benchmark_id, environment_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (revision_id, executable_id, benchmark_id, environment_id) DO UPDATE SET \
           value = excluded.value, \
           std_dev = excluded.std_dev, \
           val_min = excluded.val_min, \
           q1 = excluded.q1, \
           q3 = excluded.q3, \
           val_max = excluded.val_max, \
           date = excluded.date",
    )
    .bind(new.value)
    .bind(new.std_dev)
    .bind(q.map(|q| q.min))
    .bind(q.map(|q| q.q1))
    .bind(q.map(|q| q.q3))
    .bind(q.map(|q| q.max))
    .bind(new.date)
    .bind(new.key.revision_id)
    .bind(new.key.executable_id)
    .bind(new.key.benchmark_id)
    .bind(new.key.environment_id)
    .execute(&mut *conn)
    .await?;

    get_result(conn, &new.key)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound.into())
}

pub async fn get_result(
    conn: &mut SqliteConnection,
    key: &MeasurementKey,
) -> Result<Option<Measurement>> {
    Ok(sqlx::query_as::<_, ResultRow>(
        "SELECT id, value, std_dev, val_min, q1, q3, val_max, date, \
                revision_id, executable_id, benchmark_id, environment_id \
         FROM results \
         WHERE revision_id = ? AND executable_id = ? AND benchmark_id = ? AND environment_id = ?",
    )
    .bind(key.revision_id)
    .bind(key.executable_id)
    .bind(key.benchmark_id)
    .bind(key.environment_id)
    .fetch_optional(conn)
    .await?
    .map(Measurement::from))
}

/// Values of the `limit` most recent results of one series on `branch_id`
/// whose revision is strictly older than `before`, newest first.
pub async fn history(
    conn: &mut SqliteConnection,
    key: &MeasurementKey,
    branch_id: RowId,
    before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<f64>> {
    let rows: Vec<(f64,)> = sqlx::query_as(
        "SELECT res.value FROM results res \
         JOIN revisions rev ON rev.id = res.revision_id \
         WHERE res.benchmark_id = ? AND res.executable_id = ? AND res.environment_id = ? \
           AND rev.branch_id = ? AND rev.date < ? \
         ORDER BY rev.date DESC, rev.id DESC \
         LIMIT ?",
    )
    .bind(key.benchmark_id)
    .bind(key.executable_id)
    .bind(key.environment_id)
    .bind(branch_id)
    .bind(before)
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(v,)| v).collect())
}

/// Every result of a report key together with its benchmark, by
/// benchmark name.
pub async fn revision_results(
    conn: &mut SqliteConnection,
    key: &ReportKey,
) -> Result<Vec<(Benchmark, Measurement)>> {
    sqlx::query_as::<_, JoinedResultRow>(
        "SELECT res.id, res.value, res.std_dev, res.val_min, res.q1, res.q3, res.val_max, res.date, \
                res.revision_id, res.executable_id, res.benchmark_id, res.environment_id, \
                b.name AS b_name, b.description AS b_description, \
                b.benchmark_type AS b_benchmark_type, b.data_type AS b_data_type, \
                b.units_title AS b_units_title, b.units AS b_units, \
                b.lessisbetter AS b_lessisbetter, b.default_on_comparison AS b_default_on_comparison \
         FROM results res JOIN benchmarks b ON b.id = res.benchmark_id \
         WHERE res.revision_id = ? AND res.executable_id = ? AND res.environment_id = ? \
         ORDER BY b.name, b.id",
    )
    .bind(key.revision_id)
    .bind(key.executable_id)
    .bind(key.environment_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(JoinedResultRow::split)
    .collect()
}

/// Number of results stored for a report key.
pub async fn count_results(conn: &mut SqliteConnection, key: &ReportKey) -> Result<usize> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM results \
         WHERE revision_id = ? AND executable_id = ? AND environment_id = ?",
    )
    .bind(key.revision_id)
    .bind(key.executable_id)
    .bind(key.environment_id)
    .fetch_one(conn)
    .await?;
    Ok(count as usize)
}

/// Benchmark id → value for one report key.
pub async fn values_by_benchmark(
    conn: &mut SqliteConnection,
    key: &ReportKey,
) -> Result<HashMap<RowId, f64>> {
    let rows: Vec<(i64, f64)> = sqlx::query_as(
        "SELECT benchmark_id, value FROM results \
         WHERE revision_id = ? AND executable_id = ? AND environment_id = ?",
    )
    .bind(key.revision_id)
    .bind(key.executable_id)
    .bind(key.environment_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().collect())
}

/// One point of a timeline series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub measurement: Measurement,
    pub revision: Revision,
}

#[derive(FromRow)]
struct SeriesRow {
    #[sqlx(flatten)]
    result: ResultRow,
    r_commitid: String,
    r_tag: String,
    r_date: DateTime<Utc>,
    r_message: String,
    r_author: String,
    r_branch_id: i64,
}

/// The newest `limit` results of one series on a branch, newest first.
pub async fn series(
    conn: &mut SqliteConnection,
    benchmark_id: RowId,
    executable_id: RowId,
    environment_id: RowId,
    branch_id: RowId,
    limit: usize,
) -> Result<Vec<SeriesPoint>> {
    let rows = sqlx::query_as::<_, SeriesRow>(
        "SELECT res.id, res.value, res.std_dev, res.val_min, res.q1, res.q3, res.val_max, res.date, \
                res.revision_id, res.executable_id, res.benchmark_id, res.environment_id, \
                rev.commitid AS r_commitid, rev.tag AS r_tag, rev.date AS r_date, \
                rev.message AS r_message, rev.author AS r_author, rev.branch_id AS r_branch_id \
         FROM results res JOIN revisions rev ON rev.id = res.revision_id \
         WHERE res.benchmark_id = ? AND res.executable_id = ? AND res.environment_id = ? \
           AND rev.branch_id = ? \
         ORDER BY rev.date DESC, rev.id DESC \
         LIMIT ?",
    )
    .bind(benchmark_id)
    .bind(executable_id)
    .bind(environment_id)
    .bind(branch_id)
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let revision = Revision::from(RevisionRow {
                id: row.result.revision_id,
                commitid: row.r_commitid,
                tag: row.r_tag,
                date: row.r_date,
                message: row.r_message,
                author: row.r_author,
                branch_id: row.r_branch_id,
            });
            SeriesPoint {
                measurement: row.result.into(),
                revision,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{day, file_database, fixture, fixture_on, revision};
    use crate::StorageError;
    use benchwatch_core::model::Quartiles;

    fn new_result(key: MeasurementKey, value: f64) -> NewMeasurement {
        NewMeasurement {
            key,
            value,
            std_dev: None,
            quartiles: None,
            date: day(1),
        }
    }

    #[tokio::test]
    async fn test_resubmission_overwrites_single_row() {
        let fx = fixture().await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };
        let mut conn = fx.db.acquire().await.unwrap();

        let first = upsert_result(&mut conn, &new_result(key, 1.0)).await.unwrap();
        let mut second = new_result(key, 2.0);
        second.std_dev = Some(0.5);
        let second = upsert_result(&mut conn, &second).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.value, 2.0);
        assert_eq!(second.std_dev, Some(0.5));
        assert_eq!(count_results(&mut conn, &key.report_key()).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_write_transactions_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture_on(file_database(&dir).await).await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };

        // Each writer reads before it writes, like ingestion does.
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let db = fx.db.clone();
                tokio::spawn(async move {
                    let mut tx = db.begin_immediate().await?;
                    get_result(&mut *tx, &key).await?;
                    upsert_result(&mut *tx, &new_result(key, f64::from(i))).await?;
                    tx.commit().await?;
                    Ok::<_, StorageError>(())
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut conn = fx.db.acquire().await.unwrap();
        assert_eq!(count_results(&mut conn, &key.report_key()).await.unwrap(), 1);
        let stored = get_result(&mut conn, &key).await.unwrap().unwrap();
        assert!((0.0..16.0).contains(&stored.value));
    }

    #[tokio::test]
    async fn test_quartiles_round_trip_through_columns() {
        let fx = fixture().await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };
        let mut conn = fx.db.acquire().await.unwrap();
        let mut new = new_result(key, 2.0);
        new.quartiles = Some(Quartiles { min: 1.0, q1: 1.5, q3: 2.5, max: 3.0 });
        let stored = upsert_result(&mut conn, &new).await.unwrap();
        assert_eq!(stored.quartiles, new.quartiles);
    }

    #[tokio::test]
    async fn test_unknown_dimension_rejected_by_foreign_key() {
        let fx = fixture().await;
        let rev = revision(&fx.db, &fx.branch, "abc", 1).await;
        let key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: 9999,
            environment_id: fx.environment.id,
            revision_id: rev.id,
        };
        let mut conn = fx.db.acquire().await.unwrap();
        assert!(upsert_result(&mut conn, &new_result(key, 1.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_history_is_strictly_older_and_newest_first() {
        let fx = fixture().await;
        let mut revs = Vec::new();
        for (i, d) in [1u32, 2, 3, 4].iter().enumerate() {
            revs.push(revision(&fx.db, &fx.branch, &format!("c{}", i), *d).await);
        }
        let mut conn = fx.db.acquire().await.unwrap();
        for (i, rev) in revs.iter().enumerate() {
            let key = MeasurementKey {
                benchmark_id: fx.benchmark.id,
                executable_id: fx.executable.id,
                environment_id: fx.environment.id,
                revision_id: rev.id,
            };
            upsert_result(&mut conn, &new_result(key, (i + 1) as f64 * 10.0))
                .await
                .unwrap();
        }

        let key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: revs[3].id,
        };
        let values = history(&mut conn, &key, fx.branch.id, revs[3].date, 10)
            .await
            .unwrap();
        assert_eq!(values, vec![30.0, 20.0, 10.0]);

        let limited = history(&mut conn, &key, fx.branch.id, revs[3].date, 2)
            .await
            .unwrap();
        assert_eq!(limited, vec![30.0, 20.0]);

        let points = series(
            &mut conn,
            fx.benchmark.id,
            fx.executable.id,
            fx.environment.id,
            fx.branch.id,
            3,
        )
        .await
        .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].revision.commitid, "c3");
        assert_eq!(points[0].measurement.value, 40.0);
    }

    #[tokio::test]
    async fn test_history_ignores_other_branches() {
        let fx = fixture().await;
        let mut conn = fx.db.acquire().await.unwrap();
        let (other, _) =
            crate::dimensions::get_or_create_branch(&mut conn, fx.branch.project_id, "feature")
                .await
                .unwrap();
        drop(conn);

        let old_other = revision(&fx.db, &other, "o1", 1).await;
        let current = revision(&fx.db, &fx.branch, "m2", 2).await;
        let mut conn = fx.db.acquire().await.unwrap();
        let other_key = MeasurementKey {
            benchmark_id: fx.benchmark.id,
            executable_id: fx.executable.id,
            environment_id: fx.environment.id,
            revision_id: old_other.id,
        };
        upsert_result(&mut conn, &new_result(other_key, 5.0)).await.unwrap();

        let key = MeasurementKey {
            revision_id: current.id,
            ..other_key
        };
        let values = history(&mut conn, &key, fx.branch.id, current.date, 10)
            .await
            .unwrap();
        assert!(values.is_empty());
    }
}
