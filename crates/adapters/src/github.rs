// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Commit logs from the GitHub REST API.

use crate::{CommitLog, CommitLogError, CommitRecord};
use async_trait::async_trait;
use benchwatch_core::config::CommitsConfig;
use benchwatch_core::model::{short_commitid, Project, Revision};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("benchwatch/", env!("CARGO_PKG_VERSION"));

/// GitHub backend. Holds no local state, so [`CommitLog::update_repo`] is a
/// no-op.
#[derive(Debug, Clone)]
pub struct GithubCommitLog {
    client: reqwest::Client,
    api_url: String,
}

impl GithubCommitLog {
    pub fn new(config: &CommitsConfig) -> Result<Self, CommitLogError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = &config.github_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| CommitLogError::Request(format!("invalid GitHub token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CommitLogError::Request(format!("HTTP client initialization failed: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, CommitLogError> {
        debug!(url = %url, "Fetching GitHub commit log");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CommitLogError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CommitLogError::Request(format!(
                "HTTP error {}: {}",
                response.status(),
                url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CommitLogError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CommitLog for GithubCommitLog {
    async fn update_repo(&self, _project: &Project) -> Result<(), CommitLogError> {
        Ok(())
    }

    async fn get_logs(
        &self,
        project: &Project,
        start: &Revision,
        end: &Revision,
    ) -> Result<Vec<CommitRecord>, CommitLogError> {
        let (owner, repo) = parse_repo_path(&project.repo_path)?;
        let base = format!("{}/repos/{}/{}", self.api_url, owner, repo);

        if start.commitid == end.commitid {
            let commit: ApiCommit = self.fetch(&format!("{}/commits/{}", base, end.commitid)).await?;
            return Ok(vec![commit.into_record()]);
        }

        let compare: ApiCompare = self
            .fetch(&format!("{}/compare/{}...{}", base, start.commitid, end.commitid))
            .await?;
        Ok(compare.into_records())
    }
}

/// Split a GitHub repository URL into owner and repository name.
///
/// Accepts `https://github.com/owner/repo(.git)`, `git://github.com/...`,
/// `git@github.com:owner/repo.git` and a bare `owner/repo`.
pub fn parse_repo_path(path: &str) -> Result<(String, String), CommitLogError> {
    let invalid = || CommitLogError::InvalidRepoPath(path.to_string());

    let trimmed = path.trim();
    let rest = trimmed
        .strip_prefix("git@github.com:")
        .or_else(|| {
            let without_scheme = trimmed
                .strip_prefix("https://")
                .or_else(|| trimmed.strip_prefix("http://"))
                .or_else(|| trimmed.strip_prefix("git://"))?;
            let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
            without_www.strip_prefix("github.com/")
        })
        .unwrap_or(trimmed);

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let mut parts = rest.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() && !owner.contains(':') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(invalid()),
    }
}

#[derive(Debug, Deserialize)]
struct ApiCompare {
    #[serde(default)]
    commits: Vec<ApiCommit>,
}

impl ApiCompare {
    /// Compare lists commits oldest first; logs are shown newest first.
    fn into_records(self) -> Vec<CommitRecord> {
        self.commits
            .into_iter()
            .rev()
            .map(ApiCommit::into_record)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    #[serde(default)]
    message: String,
    author: Option<ApiAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    date: Option<DateTime<Utc>>,
}

impl ApiCommit {
    fn into_record(self) -> CommitRecord {
        let (author, author_email, date) = match self.commit.author {
            Some(a) => (a.name, a.email, a.date.unwrap_or_default()),
            None => (String::new(), String::new(), DateTime::<Utc>::default()),
        };
        CommitRecord {
            date,
            author,
            author_email,
            message: self.commit.message,
            short_commit_id: short_commitid(&self.sha).to_string(),
            commitid: self.sha,
        }
    }
}
