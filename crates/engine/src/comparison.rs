// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Latest values of every benchmark across executables and environments.

use crate::Engine;
use benchwatch_core::model::{Executable, ReportKey, Revision, RowId};
use benchwatch_core::Result;
use benchwatch_storage::{dimensions, results, revisions};
use serde::Serialize;
use std::collections::BTreeMap;

/// An executable at the latest revision of its project's default branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonExecutable {
    /// `"{executable id}+L+{branch}"`, stable across requests.
    pub key: String,
    pub project: String,
    pub executable: Executable,
    pub revision: Revision,
}

/// Values keyed by executable key, environment id and benchmark id.
/// Missing results are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonData {
    pub executables: Vec<ComparisonExecutable>,
    pub values: BTreeMap<String, BTreeMap<RowId, BTreeMap<RowId, Option<f64>>>>,
}

impl Engine {
    pub async fn comparison(&self) -> Result<ComparisonData> {
        let mut conn = self.db.acquire().await?;
        let environments = dimensions::list_environments(&mut conn).await?;
        let benchmarks = dimensions::list_benchmarks(&mut conn).await?;

        let mut executables = Vec::new();
        for project in dimensions::tracked_projects(&mut conn).await? {
            let Some(branch) = dimensions::default_branch(&mut conn, &project).await? else {
                continue;
            };
            let Some(revision) = revisions::latest_revisions(&mut conn, branch.id, 1)
                .await?
                .into_iter()
                .next()
            else {
                continue;
            };
            for executable in dimensions::project_executables(&mut conn, project.id).await? {
                executables.push(ComparisonExecutable {
                    key: format!("{}+L+{}", executable.id, branch.name),
                    project: project.name.clone(),
                    executable,
                    revision: revision.clone(),
                });
            }
        }

        let mut values = BTreeMap::new();
        for exe in &executables {
            let mut by_env = BTreeMap::new();
            for environment in &environments {
                let stored = results::values_by_benchmark(
                    &mut conn,
                    &ReportKey {
                        executable_id: exe.executable.id,
                        environment_id: environment.id,
                        revision_id: exe.revision.id,
                    },
                )
                .await?;
                let by_bench = benchmarks
                    .iter()
                    .map(|b| (b.id, stored.get(&b.id).copied()))
                    .collect();
                by_env.insert(environment.id, by_bench);
            }
            values.insert(exe.key.clone(), by_env);
        }

        Ok(ComparisonData { executables, values })
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{engine, payload, register_executable};

    #[tokio::test]
    async fn test_latest_revision_values() {
        let engine = engine().await;
        register_executable(&engine).await;
        engine.save_result(&payload("c1", 1, "float", 1.0), false).await.unwrap();
        engine.save_result(&payload("c2", 2, "float", 2.0), false).await.unwrap();
        engine.save_result(&payload("c1", 1, "int", 3.0), false).await.unwrap();

        let data = engine.comparison().await.unwrap();
        assert_eq!(data.executables.len(), 1);
        let exe = &data.executables[0];
        assert_eq!(exe.key, "1+L+master");
        assert_eq!(exe.revision.commitid, "c2");

        let by_bench = &data.values["1+L+master"][&1];
        // Benchmarks are listed by name: float (1), int (2).
        assert_eq!(by_bench[&1], Some(2.0));
        assert_eq!(by_bench[&2], None);
    }

    #[tokio::test]
    async fn test_empty_database() {
        let engine = engine().await;
        let data = engine.comparison().await.unwrap();
        assert!(data.executables.is_empty());
        assert!(data.values.is_empty());
    }
}
