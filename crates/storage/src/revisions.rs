//! Revisions and their ordering within a branch.
//!
//! Revisions are ordered by `date` inside a branch. Dates are stored as
//! RFC 3339 text in UTC with whole seconds, so lexical and chronological
//! order agree.

use crate::rows::RevisionRow;
use crate::Result;
use benchwatch_core::model::{Revision, RowId};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn get_revision(conn: &mut SqliteConnection, id: RowId) -> Result<Option<Revision>> {
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT id, commitid, tag, date, message, author, branch_id FROM revisions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Revision::from))
}

pub async fn find_revision(
    conn: &mut SqliteConnection,
    branch_id: RowId,
    commitid: &str,
) -> Result<Option<Revision>> {
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT id, commitid, tag, date, message, author, branch_id \
         FROM revisions WHERE branch_id = ? AND commitid = ?",
    )
    .bind(branch_id)
    .bind(commitid)
    .fetch_optional(conn)
    .await?
    .map(Revision::from))
}

/// Resolve a revision, creating it with `date` on first sight.
///
/// The date of an existing revision is never changed. The flag is true when
/// this call inserted the row.
pub async fn get_or_create_revision(
    conn: &mut SqliteConnection,
    branch_id: RowId,
    commitid: &str,
    date: DateTime<Utc>,
) -> Result<(Revision, bool)> {
    if let Some(revision) = find_revision(&mut *conn, branch_id, commitid).await? {
        return Ok((revision, false));
    }
    let inserted = sqlx::query(
        "INSERT INTO revisions (commitid, date, branch_id) VALUES (?, ?, ?) \
         ON CONFLICT (commitid, branch_id) DO NOTHING",
    )
    .bind(commitid)
    .bind(date)
    .bind(branch_id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;
    let revision = find_revision(&mut *conn, branch_id, commitid)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((revision, inserted))
}

/// Revisions of any branch of `project_id` whose commit id starts with
/// `prefix`, newest first. At most `limit` rows.
pub async fn find_by_commit_prefix(
    conn: &mut SqliteConnection,
    project_id: RowId,
    prefix: &str,
    limit: i64,
) -> Result<Vec<Revision>> {
    let pattern = format!("{}%", escape_like(prefix));
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT r.id, r.commitid, r.tag, r.date, r.message, r.author, r.branch_id \
         FROM revisions r JOIN branches b ON b.id = r.branch_id \
         WHERE b.project_id = ? AND r.commitid LIKE ? ESCAPE '\\' \
         ORDER BY r.date DESC, r.id DESC LIMIT ?",
    )
    .bind(project_id)
    .bind(pattern)
    .bind(limit)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Revision::from)
    .collect())
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The latest revision on the same branch strictly before `revision`.
pub async fn previous_revision(
    conn: &mut SqliteConnection,
    revision: &Revision,
) -> Result<Option<Revision>> {
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT id, commitid, tag, date, message, author, branch_id FROM revisions \
         WHERE branch_id = ? AND date < ? ORDER BY date DESC, id DESC LIMIT 1",
    )
    .bind(revision.branch_id)
    .bind(revision.date)
    .fetch_optional(conn)
    .await?
    .map(Revision::from))
}

/// The earliest revision on the same branch strictly after `revision`.
pub async fn next_revision(
    conn: &mut SqliteConnection,
    revision: &Revision,
) -> Result<Option<Revision>> {
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT id, commitid, tag, date, message, author, branch_id FROM revisions \
         WHERE branch_id = ? AND date > ? ORDER BY date ASC, id ASC LIMIT 1",
    )
    .bind(revision.branch_id)
    .bind(revision.date)
    .fetch_optional(conn)
    .await?
    .map(Revision::from))
}

/// The newest `limit` revisions of a branch.
pub async fn latest_revisions(
    conn: &mut SqliteConnection,
    branch_id: RowId,
    limit: i64,
) -> Result<Vec<Revision>> {
    Ok(sqlx::query_as::<_, RevisionRow>(
        "SELECT id, commitid, tag, date, message, author, branch_id FROM revisions \
         WHERE branch_id = ? ORDER BY date DESC, id DESC LIMIT ?",
    )
    .bind(branch_id)
    .bind(limit)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Revision::from)
    .collect())
}

/// Store author and message fetched from the commit log.
pub async fn update_commit_info(
    conn: &mut SqliteConnection,
    id: RowId,
    author: &str,
    message: &str,
) -> Result<()> {
    sqlx::query("UPDATE revisions SET author = ?, message = ? WHERE id = ?")
        .bind(author)
        .bind(message)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
