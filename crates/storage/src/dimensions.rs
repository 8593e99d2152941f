//! Projects, branches, executables, environments and benchmarks.

use crate::rows::{BenchmarkRow, BranchRow, EnvironmentRow, ExecutableRow, ProjectRow};
use crate::Result;
use benchwatch_core::model::{
    Benchmark, BenchmarkSpec, Branch, Environment, Executable, Project, RepoType, RowId,
};
use sqlx::SqliteConnection;

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Attributes of a project registered administratively.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub repo_type: RepoType,
    pub repo_path: String,
    pub repo_user: String,
    pub commit_browsing_url: String,
    pub track: bool,
    pub default_branch: String,
}

impl NewProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo_type: RepoType::None,
            repo_path: String::new(),
            repo_user: String::new(),
            commit_browsing_url: String::new(),
            track: true,
            default_branch: "master".to_string(),
        }
    }
}

pub async fn get_project(conn: &mut SqliteConnection, id: RowId) -> Result<Option<Project>> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, repo_type, repo_path, repo_user, commit_browsing_url, track, default_branch \
         FROM projects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Project::try_from)
    .transpose()
}

pub async fn find_project(conn: &mut SqliteConnection, name: &str) -> Result<Option<Project>> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, repo_type, repo_path, repo_user, commit_browsing_url, track, default_branch \
         FROM projects WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Project::try_from)
    .transpose()
}

/// Resolve a project by name, creating it with default attributes.
///
/// The flag is true when this call inserted the row.
pub async fn get_or_create_project(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<(Project, bool)> {
    if let Some(project) = find_project(&mut *conn, name).await? {
        return Ok((project, false));
    }
    let inserted = sqlx::query("INSERT INTO projects (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?
        .rows_affected()
        == 1;
    let project = find_project(&mut *conn, name)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((project, inserted))
}

/// Create a project or overwrite the attributes of an existing one.
pub async fn upsert_project(conn: &mut SqliteConnection, new: &NewProject) -> Result<Project> {
    sqlx::query(
        "INSERT INTO projects (name, repo_type, repo_path, repo_user, commit_browsing_url, track, default_branch) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (name) DO UPDATE SET \
           repo_type = excluded.repo_type, \
           repo_path = excluded.repo_path, \
           repo_user = excluded.repo_user, \
           commit_browsing_url = excluded.commit_browsing_url, \
           track = excluded.track, \
           default_branch = excluded.default_branch",
    )
    .bind(&new.name)
    .bind(new.repo_type.code())
    .bind(&new.repo_path)
    .bind(&new.repo_user)
    .bind(&new.commit_browsing_url)
    .bind(new.track)
    .bind(&new.default_branch)
    .execute(&mut *conn)
    .await?;
    find_project(conn, &new.name)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound.into())
}

/// Projects whose changes are reported, by name.
pub async fn tracked_projects(conn: &mut SqliteConnection) -> Result<Vec<Project>> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, repo_type, repo_path, repo_user, commit_browsing_url, track, default_branch \
         FROM projects WHERE track = 1 ORDER BY name",
    )
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Project::try_from)
    .collect()
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

pub async fn get_branch(conn: &mut SqliteConnection, id: RowId) -> Result<Option<Branch>> {
    Ok(
        sqlx::query_as::<_, BranchRow>("SELECT id, name, project_id FROM branches WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(Branch::from),
    )
}

pub async fn find_branch(
    conn: &mut SqliteConnection,
    project_id: RowId,
    name: &str,
) -> Result<Option<Branch>> {
    Ok(sqlx::query_as::<_, BranchRow>(
        "SELECT id, name, project_id FROM branches WHERE project_id = ? AND name = ?",
    )
    .bind(project_id)
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Branch::from))
}

pub async fn get_or_create_branch(
    conn: &mut SqliteConnection,
    project_id: RowId,
    name: &str,
) -> Result<(Branch, bool)> {
    if let Some(branch) = find_branch(&mut *conn, project_id, name).await? {
        return Ok((branch, false));
    }
    let inserted = sqlx::query(
        "INSERT INTO branches (name, project_id) VALUES (?, ?) ON CONFLICT (name, project_id) DO NOTHING",
    )
    .bind(name)
    .bind(project_id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;
    let branch = find_branch(&mut *conn, project_id, name)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((branch, inserted))
}

/// The default branch of `project`, if it has ever received a revision.
pub async fn default_branch(
    conn: &mut SqliteConnection,
    project: &Project,
) -> Result<Option<Branch>> {
    find_branch(conn, project.id, &project.default_branch).await
}

// ---------------------------------------------------------------------------
// Executables
// ---------------------------------------------------------------------------

pub async fn get_executable(conn: &mut SqliteConnection, id: RowId) -> Result<Option<Executable>> {
    Ok(sqlx::query_as::<_, ExecutableRow>(
        "SELECT id, name, description, project_id FROM executables WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Executable::from))
}

pub async fn find_executable(
    conn: &mut SqliteConnection,
    project_id: RowId,
    name: &str,
) -> Result<Option<Executable>> {
    Ok(sqlx::query_as::<_, ExecutableRow>(
        "SELECT id, name, description, project_id FROM executables WHERE project_id = ? AND name = ?",
    )
    .bind(project_id)
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Executable::from))
}

pub async fn get_or_create_executable(
    conn: &mut SqliteConnection,
    project_id: RowId,
    name: &str,
) -> Result<(Executable, bool)> {
    if let Some(executable) = find_executable(&mut *conn, project_id, name).await? {
        return Ok((executable, false));
    }
    let inserted = sqlx::query(
        "INSERT INTO executables (name, project_id) VALUES (?, ?) ON CONFLICT (name, project_id) DO NOTHING",
    )
    .bind(name)
    .bind(project_id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;
    let executable = find_executable(&mut *conn, project_id, name)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((executable, inserted))
}

pub async fn project_executables(
    conn: &mut SqliteConnection,
    project_id: RowId,
) -> Result<Vec<Executable>> {
    Ok(sqlx::query_as::<_, ExecutableRow>(
        "SELECT id, name, description, project_id FROM executables WHERE project_id = ? ORDER BY name",
    )
    .bind(project_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Executable::from)
    .collect())
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

/// Attributes of an environment registered administratively.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewEnvironment {
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub os: String,
    pub kernel: String,
}

impl NewEnvironment {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

pub async fn get_environment(
    conn: &mut SqliteConnection,
    id: RowId,
) -> Result<Option<Environment>> {
    Ok(sqlx::query_as::<_, EnvironmentRow>(
        "SELECT id, name, cpu, memory, os, kernel FROM environments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Environment::from))
}

pub async fn find_environment(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Environment>> {
    Ok(sqlx::query_as::<_, EnvironmentRow>(
        "SELECT id, name, cpu, memory, os, kernel FROM environments WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Environment::from))
}

pub async fn list_environments(conn: &mut SqliteConnection) -> Result<Vec<Environment>> {
    Ok(sqlx::query_as::<_, EnvironmentRow>(
        "SELECT id, name, cpu, memory, os, kernel FROM environments ORDER BY name",
    )
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Environment::from)
    .collect())
}

/// Register an environment or update the description of an existing one.
pub async fn upsert_environment(
    conn: &mut SqliteConnection,
    new: &NewEnvironment,
) -> Result<Environment> {
    sqlx::query(
        "INSERT INTO environments (name, cpu, memory, os, kernel) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (name) DO UPDATE SET \
           cpu = excluded.cpu, memory = excluded.memory, os = excluded.os, kernel = excluded.kernel",
    )
    .bind(&new.name)
    .bind(&new.cpu)
    .bind(&new.memory)
    .bind(&new.os)
    .bind(&new.kernel)
    .execute(&mut *conn)
    .await?;
    find_environment(conn, &new.name)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound.into())
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

pub async fn get_benchmark(conn: &mut SqliteConnection, id: RowId) -> Result<Option<Benchmark>> {
    sqlx::query_as::<_, BenchmarkRow>(
        "SELECT id, name, description, benchmark_type, data_type, units_title, units, \
                lessisbetter, default_on_comparison \
         FROM benchmarks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(Benchmark::try_from)
    .transpose()
}

pub async fn find_benchmark(conn: &mut SqliteConnection, name: &str) -> Result<Option<Benchmark>> {
    sqlx::query_as::<_, BenchmarkRow>(
        "SELECT id, name, description, benchmark_type, data_type, units_title, units, \
                lessisbetter, default_on_comparison \
         FROM benchmarks WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Benchmark::try_from)
    .transpose()
}

/// Resolve a benchmark by name, creating it from `spec` on first sight.
///
/// An existing benchmark keeps its attributes; `spec` only seeds new rows.
pub async fn get_or_create_benchmark(
    conn: &mut SqliteConnection,
    spec: &BenchmarkSpec,
) -> Result<(Benchmark, bool)> {
    if let Some(benchmark) = find_benchmark(&mut *conn, &spec.name).await? {
        return Ok((benchmark, false));
    }
    let inserted = sqlx::query(
        "INSERT INTO benchmarks (name, description, data_type, units_title, units, lessisbetter) \
         VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (name) DO NOTHING",
    )
    .bind(&spec.name)
    .bind(&spec.description)
    .bind(spec.data_type.code())
    .bind(&spec.units_title)
    .bind(&spec.units)
    .bind(spec.lessisbetter)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        == 1;
    let benchmark = find_benchmark(&mut *conn, &spec.name)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((benchmark, inserted))
}

/// All benchmarks ordered by name.
pub async fn list_benchmarks(conn: &mut SqliteConnection) -> Result<Vec<Benchmark>> {
    sqlx::query_as::<_, BenchmarkRow>(
        "SELECT id, name, description, benchmark_type, data_type, units_title, units, \
                lessisbetter, default_on_comparison \
         FROM benchmarks ORDER BY name, id",
    )
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Benchmark::try_from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_get_or_create_project_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let (first, created) = get_or_create_project(&mut conn, "pypy").await.unwrap();
        assert!(created);
        assert!(first.track);
        assert_eq!(first.default_branch, "master");

        let (second, created) = get_or_create_project(&mut conn, "pypy").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_upsert_project_overwrites_attributes() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut new = NewProject::named("cpython");
        new.repo_type = RepoType::Github;
        new.repo_path = "https://github.com/python/cpython".to_string();
        let created = upsert_project(&mut conn, &new).await.unwrap();
        assert_eq!(created.repo_type, RepoType::Github);

        new.track = false;
        new.default_branch = "main".to_string();
        let updated = upsert_project(&mut conn, &new).await.unwrap();
        assert_eq!(created.id, updated.id);
        assert!(!updated.track);
        assert_eq!(updated.default_branch, "main");
        assert!(tracked_projects(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_branch_and_executable_scoped_to_project() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let (a, _) = get_or_create_project(&mut conn, "a").await.unwrap();
        let (b, _) = get_or_create_project(&mut conn, "b").await.unwrap();
        let (ba, _) = get_or_create_branch(&mut conn, a.id, "master").await.unwrap();
        let (bb, _) = get_or_create_branch(&mut conn, b.id, "master").await.unwrap();
        assert_ne!(ba.id, bb.id);

        let (ea, _) = get_or_create_executable(&mut conn, a.id, "exe").await.unwrap();
        assert!(find_executable(&mut conn, b.id, "exe").await.unwrap().is_none());
        assert_eq!(
            find_executable(&mut conn, a.id, "exe").await.unwrap(),
            Some(ea)
        );
        assert_eq!(default_branch(&mut conn, &a).await.unwrap(), Some(ba));
    }

    #[tokio::test]
    async fn test_benchmark_spec_only_seeds_new_rows() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut spec = BenchmarkSpec::named("throughput");
        spec.lessisbetter = false;
        spec.units = "ops/s".to_string();
        let (created, is_new) = get_or_create_benchmark(&mut conn, &spec).await.unwrap();
        assert!(is_new);
        assert!(!created.lessisbetter);

        let (again, is_new) =
            get_or_create_benchmark(&mut conn, &BenchmarkSpec::named("throughput"))
                .await
                .unwrap();
        assert!(!is_new);
        assert!(!again.lessisbetter);
        assert_eq!(again.units, "ops/s");
    }

    #[tokio::test]
    async fn test_environment_upsert() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let env = upsert_environment(&mut conn, &NewEnvironment::named("Dual Core"))
            .await
            .unwrap();
        let mut updated = NewEnvironment::named("Dual Core");
        updated.cpu = "Core 2 Duo 8200".to_string();
        let env2 = upsert_environment(&mut conn, &updated).await.unwrap();
        assert_eq!(env.id, env2.id);
        assert_eq!(env2.cpu, "Core 2 Duo 8200");
        assert_eq!(list_environments(&mut conn).await.unwrap().len(), 1);
    }
}
