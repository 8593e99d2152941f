// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Commit log collaborators.
//!
//! The results engine asks a [`CommitLog`] for the commits between two
//! revisions of a project, to show what changed and to fill in author and
//! message of newly seen revisions. Which backend answers depends on the
//! project's [`RepoType`]:
//!
//! | repo type | backend |
//! |---|---|
//! | `N` (none) | [`NoCommitLog`], always empty |
//! | `H` (GitHub) | [`GithubCommitLog`], GitHub REST API over `reqwest` |
//! | `G` / `M` | unsupported, local mirrors are not managed |
//!
//! [`RepoCommitLog`] performs that dispatch and is what services install.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod github;

use async_trait::async_trait;
use benchwatch_core::config::CommitsConfig;
use benchwatch_core::model::{short_commitid, Project, RepoType, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use github::GithubCommitLog;

/// Errors raised while fetching commit logs.
#[derive(Debug, Error)]
pub enum CommitLogError {
    /// The project's repository type has no backend.
    #[error("Commit logs are not supported for repository type '{0}'")]
    Unsupported(&'static str),

    /// The project's repository path could not be understood.
    #[error("Invalid repository path '{0}'")]
    InvalidRepoPath(String),

    /// The remote could not be reached or answered with an error.
    #[error("Commit log request failed: {0}")]
    Request(String),

    /// The remote answered with something that is not a commit log.
    #[error("Unexpected commit log response: {0}")]
    Decode(String),
}

impl From<CommitLogError> for benchwatch_core::Error {
    fn from(err: CommitLogError) -> Self {
        benchwatch_core::Error::RemoteLookup(err.to_string())
    }
}

/// One commit as shown next to a change report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub date: DateTime<Utc>,
    pub author: String,
    pub author_email: String,
    pub message: String,
    pub commitid: String,
    pub short_commit_id: String,
}

impl CommitRecord {
    /// The record a stored revision describes by itself.
    pub fn from_revision(revision: &Revision) -> Self {
        Self {
            date: revision.date,
            author: revision.author.clone(),
            author_email: String::new(),
            message: revision.message.clone(),
            commitid: revision.commitid.clone(),
            short_commit_id: short_commitid(&revision.commitid).to_string(),
        }
    }
}

/// Source of commit history for a project.
#[async_trait]
pub trait CommitLog: Send + Sync {
    /// Bring any local view of the project's repository up to date.
    async fn update_repo(&self, project: &Project) -> Result<(), CommitLogError>;

    /// Commits after `start` up to and including `end`, newest first.
    ///
    /// When `start` and `end` are the same revision only that commit is
    /// returned.
    async fn get_logs(
        &self,
        project: &Project,
        start: &Revision,
        end: &Revision,
    ) -> Result<Vec<CommitRecord>, CommitLogError>;
}

/// Backend for projects without a repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommitLog;

#[async_trait]
impl CommitLog for NoCommitLog {
    async fn update_repo(&self, _project: &Project) -> Result<(), CommitLogError> {
        Ok(())
    }

    async fn get_logs(
        &self,
        _project: &Project,
        _start: &Revision,
        _end: &Revision,
    ) -> Result<Vec<CommitRecord>, CommitLogError> {
        Ok(Vec::new())
    }
}

/// Dispatches on the project's repository type.
#[derive(Debug, Clone)]
pub struct RepoCommitLog {
    github: GithubCommitLog,
}

impl RepoCommitLog {
    pub fn new(config: &CommitsConfig) -> Result<Self, CommitLogError> {
        Ok(Self {
            github: GithubCommitLog::new(config)?,
        })
    }
}

#[async_trait]
impl CommitLog for RepoCommitLog {
    async fn update_repo(&self, project: &Project) -> Result<(), CommitLogError> {
        match project.repo_type {
            RepoType::None => NoCommitLog.update_repo(project).await,
            RepoType::Github => self.github.update_repo(project).await,
            other => Err(CommitLogError::Unsupported(other.code())),
        }
    }

    async fn get_logs(
        &self,
        project: &Project,
        start: &Revision,
        end: &Revision,
    ) -> Result<Vec<CommitRecord>, CommitLogError> {
        match project.repo_type {
            RepoType::None => NoCommitLog.get_logs(project, start, end).await,
            RepoType::Github => self.github.get_logs(project, start, end).await,
            other => Err(CommitLogError::Unsupported(other.code())),
        }
    }
}
