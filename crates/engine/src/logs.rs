// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Commit logs leading up to a revision.

use crate::Engine;
use benchwatch_adapters::CommitRecord;
use benchwatch_core::model::{Revision, RowId};
use benchwatch_core::{Error, Result};
use benchwatch_storage::{dimensions, revisions};
use serde::Serialize;
use tracing::error;

/// A commit with its link into the project's commit browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitLogEntry {
    #[serde(flatten)]
    pub record: CommitRecord,
    pub commit_browse_url: String,
}

/// Commits between a revision and its predecessor on the branch.
///
/// When the collaborator fails or has nothing, `logs` holds only the
/// revision itself and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitLogView {
    pub revision: Revision,
    pub logs: Vec<CommitLogEntry>,
    pub error: Option<String>,
}

/// Expand `{commitid}`, `{short_commit_id}`, `{author}`, `{author_email}`,
/// `{message}` and `{date}` placeholders in a commit browsing URL.
pub fn commit_browse_url(template: &str, record: &CommitRecord) -> String {
    template
        .replace("{commitid}", &record.commitid)
        .replace("{short_commit_id}", &record.short_commit_id)
        .replace("{author_email}", &record.author_email)
        .replace("{author}", &record.author)
        .replace("{message}", &record.message)
        .replace("{date}", &record.date.to_rfc3339())
}

impl Engine {
    pub async fn commit_logs(&self, revision_id: RowId) -> Result<CommitLogView> {
        let (revision, start, project) = {
            let mut conn = self.db.acquire().await?;
            let revision = revisions::get_revision(&mut conn, revision_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Revision {} not found", revision_id)))?;
            let branch = dimensions::get_branch(&mut conn, revision.branch_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Branch {} not found", revision.branch_id)))?;
            let project = dimensions::get_project(&mut conn, branch.project_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Project {} not found", branch.project_id)))?;
            let start = revisions::previous_revision(&mut conn, &revision)
                .await?
                .unwrap_or_else(|| revision.clone());
            (revision, start, project)
        };

        let (records, error) = match self.commits.get_logs(&project, &start, &revision).await {
            Ok(records) if !records.is_empty() => (records, None),
            Ok(_) => (
                vec![CommitRecord::from_revision(&revision)],
                Some("No logs found".to_string()),
            ),
            Err(err) => {
                error!(commitid = %revision.commitid, error = %err, "Could not fetch commit logs");
                (vec![CommitRecord::from_revision(&revision)], Some(err.to_string()))
            }
        };

        let logs = records
            .into_iter()
            .map(|record| CommitLogEntry {
                commit_browse_url: commit_browse_url(&project.commit_browsing_url, &record),
                record,
            })
            .collect();

        Ok(CommitLogView {
            revision,
            logs,
            error,
        })
    }
}
