//! Command line interface for benchwatch.
//!
//! Administrative registration of projects, executables and environments,
//! batch import of result files, and read access to changes tables and
//! reports. Every command opens the database named in the settings.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod markdown;

use anyhow::{bail, Context};
use benchwatch_adapters::RepoCommitLog;
use benchwatch_core::model::{RepoType, ReportKey};
use benchwatch_core::{telemetry, ResultPayload, Settings};
use benchwatch_engine::Engine;
use benchwatch_storage::dimensions::{self, NewEnvironment, NewProject};
use benchwatch_storage::Database;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// benchwatch CLI.
#[derive(Parser, Debug)]
#[command(name = "benchwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to ./benchwatch.toml when present).
    #[arg(short, long, global = true, env = "BENCHWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of read commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Markdown tables.
    Markdown,
    /// Pretty-printed JSON.
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database schema.
    Migrate,

    /// Register an environment, or update its description.
    AddEnvironment {
        /// Unique environment name.
        name: String,
        /// CPU description.
        #[arg(long, default_value = "")]
        cpu: String,
        /// Memory description.
        #[arg(long, default_value = "")]
        memory: String,
        /// Operating system.
        #[arg(long, default_value = "")]
        os: String,
        /// Kernel version.
        #[arg(long, default_value = "")]
        kernel: String,
    },

    /// Register a project, or update its attributes.
    AddProject {
        /// Unique project name.
        name: String,
        /// Repository type: none, git, mercurial or github.
        #[arg(long, default_value = "none")]
        repo_type: String,
        /// Repository location, e.g. https://github.com/owner/repo.
        #[arg(long, default_value = "")]
        repo_path: String,
        /// Repository user, if the repository needs one.
        #[arg(long, default_value = "")]
        repo_user: String,
        /// Commit URL template, e.g. https://github.com/owner/repo/commit/{commitid}.
        #[arg(long, default_value = "")]
        commit_browsing_url: String,
        /// Branch shown in timelines and comparisons.
        #[arg(long, default_value = "master")]
        default_branch: String,
        /// Do not produce reports for this project.
        #[arg(long)]
        no_track: bool,
    },

    /// Register an executable of a project.
    AddExecutable {
        /// Project the executable belongs to.
        #[arg(long)]
        project: String,
        /// Executable name, unique within the project.
        name: String,
    },

    /// Import a JSON array of results as one batch.
    Import {
        /// File holding the results.
        file: PathBuf,
    },

    /// Show the changes table of a revision.
    Changes {
        /// Executable id.
        #[arg(long)]
        exe: i64,
        /// Environment id.
        #[arg(long)]
        env: i64,
        /// Commit id or unique prefix.
        #[arg(long)]
        rev: String,
        /// Number of earlier results forming the baseline.
        #[arg(long)]
        trend: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },

    /// Recompute stored reports.
    Refresh {
        /// Executable id.
        #[arg(long, required_unless_present = "all")]
        exe: Option<i64>,
        /// Environment id.
        #[arg(long, required_unless_present = "all")]
        env: Option<i64>,
        /// Commit id or unique prefix.
        #[arg(long, required_unless_present = "all")]
        rev: Option<String>,
        /// Refresh every stored report.
        #[arg(long, conflicts_with_all = ["exe", "env", "rev"])]
        all: bool,
    },

    /// List the latest reports.
    Reports {
        /// Output format.
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },
}

/// Parse arguments, load settings and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    telemetry::init_tracing(&settings.logging)?;

    execute(cli.command, settings).await
}

/// Run one command against the database named in `settings`.
pub async fn execute(command: Commands, settings: Settings) -> anyhow::Result<()> {
    let db = Database::connect(&settings.database)
        .await
        .context("Failed to open database")?;
    db.migrate().await.context("Failed to migrate database")?;

    match command {
        Commands::Migrate => {
            println!("{} Database schema is up to date", "✓".green());
        }

        Commands::AddEnvironment {
            name,
            cpu,
            memory,
            os,
            kernel,
        } => {
            let mut conn = db.acquire().await?;
            let environment = dimensions::upsert_environment(
                &mut conn,
                &NewEnvironment {
                    name,
                    cpu,
                    memory,
                    os,
                    kernel,
                },
            )
            .await?;
            println!(
                "{} Environment '{}' (id {})",
                "✓".green(),
                environment.name,
                environment.id
            );
        }

        Commands::AddProject {
            name,
            repo_type,
            repo_path,
            repo_user,
            commit_browsing_url,
            default_branch,
            no_track,
        } => {
            let repo_type: RepoType = repo_type.parse()?;
            let mut conn = db.acquire().await?;
            let project = dimensions::upsert_project(
                &mut conn,
                &NewProject {
                    name,
                    repo_type,
                    repo_path,
                    repo_user,
                    commit_browsing_url,
                    track: !no_track,
                    default_branch,
                },
            )
            .await?;
            println!("{} Project '{}' (id {})", "✓".green(), project.name, project.id);
        }

        Commands::AddExecutable { project, name } => {
            let mut conn = db.acquire().await?;
            let Some(project) = dimensions::find_project(&mut conn, &project).await? else {
                bail!("Project '{}' does not exist", project);
            };
            let (executable, created) =
                dimensions::get_or_create_executable(&mut conn, project.id, &name).await?;
            let verb = if created { "Created" } else { "Found" };
            println!(
                "{} {} executable '{}' (id {})",
                "✓".green(),
                verb,
                executable.name,
                executable.id
            );
        }

        Commands::Import { file } => {
            let engine = engine(db, settings)?;
            let payloads = read_payloads(&file)?;
            match engine.ingest_batch(&payloads).await {
                Ok(outcome) => {
                    println!(
                        "{} Saved {} results, {} reports created",
                        "✓".green(),
                        outcome.saved,
                        outcome.reports.len()
                    );
                    for warning in &outcome.warnings {
                        println!("{} {}", "!".yellow(), warning);
                    }
                }
                Err(err) => match err.index {
                    Some(index) => bail!("Item {} of {}: {}", index, file.display(), err.source),
                    None => bail!("{}", err.source),
                },
            }
        }

        Commands::Changes {
            exe,
            env,
            rev,
            trend,
            format,
        } => {
            let engine = engine(db, settings)?;
            let table = engine.changes_table(exe, env, &rev, trend).await?;
            match format {
                OutputFormat::Markdown => print!("{}", markdown::changes_table(&table)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table)?),
            }
        }

        Commands::Refresh { exe, env, rev, all } => {
            let engine = engine(db, settings)?;
            if all {
                let count = engine.refresh_all_reports().await?;
                println!("{} Refreshed {} reports", "✓".green(), count);
            } else if let (Some(exe), Some(env), Some(rev)) = (exe, env, rev) {
                let report = engine.refresh_report_for_commit(exe, env, &rev).await?;
                let key: ReportKey = report.key;
                println!(
                    "{} Report for revision {} is {}",
                    "✓".green(),
                    key.revision_id,
                    colorize(report.colorcode.as_str())
                );
            } else {
                bail!("--exe, --env and --rev are required unless --all is given");
            }
        }

        Commands::Reports { format } => {
            let engine = engine(db, settings)?;
            let listings = engine.report_listings().await?;
            match format {
                OutputFormat::Markdown => print!("{}", markdown::report_listings(&listings)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
            }
        }
    }

    Ok(())
}

fn engine(db: Database, settings: Settings) -> anyhow::Result<Engine> {
    let commits = RepoCommitLog::new(&settings.commits)?;
    Ok(Engine::new(db, Arc::new(commits), settings))
}

/// Read a JSON array of result payloads.
pub fn read_payloads(path: &Path) -> anyhow::Result<Vec<ResultPayload>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let payloads = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of results", path.display()))?;
    Ok(payloads)
}

fn colorize(colorcode: &str) -> colored::ColoredString {
    match colorcode {
        "red" => colorcode.red().bold(),
        "green" => colorcode.green().bold(),
        other => other.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_changes_command() {
        let cli = Cli::try_parse_from([
            "benchwatch", "changes", "--exe", "1", "--env", "2", "--rev", "abc", "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Changes { exe, env, rev, trend, format } => {
                assert_eq!((exe, env, rev.as_str(), trend), (1, 2, "abc", None));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_refresh_requires_target_or_all() {
        assert!(Cli::try_parse_from(["benchwatch", "refresh"]).is_err());
        assert!(Cli::try_parse_from(["benchwatch", "refresh", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["benchwatch", "refresh", "--all", "--exe", "1"]).is_err());
    }

    #[test]
    fn test_read_payloads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"commitid": "abc", "project": "P", "branch": "master", "executable": "e",
                "benchmark": "b", "environment": "env", "result_value": 1.5}}]"#
        )
        .unwrap();
        let payloads = read_payloads(file.path()).unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].validate().is_ok());
    }

    #[test]
    fn test_read_payloads_rejects_objects() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"commitid": "abc"}}"#).unwrap();
        assert!(read_payloads(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_register_and_import() {
        // Every command opens the database anew, so share a file.
        let mut settings = Settings::default();
        let dir = tempfile::tempdir().unwrap();
        settings.database.url = format!("sqlite://{}", dir.path().join("bw.db").display());

        execute(
            Commands::AddEnvironment {
                name: "bench-box".to_string(),
                cpu: String::new(),
                memory: String::new(),
                os: String::new(),
                kernel: String::new(),
            },
            settings.clone(),
        )
        .await
        .unwrap();
        execute(
            Commands::AddProject {
                name: "P".to_string(),
                repo_type: "none".to_string(),
                repo_path: String::new(),
                repo_user: String::new(),
                commit_browsing_url: String::new(),
                default_branch: "master".to_string(),
                no_track: false,
            },
            settings.clone(),
        )
        .await
        .unwrap();
        execute(
            Commands::AddExecutable {
                project: "P".to_string(),
                name: "e".to_string(),
            },
            settings.clone(),
        )
        .await
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"commitid": "abc", "project": "P", "branch": "master", "executable": "e",
                "benchmark": "b", "environment": "bench-box", "result_value": 1.5}}]"#
        )
        .unwrap();
        execute(
            Commands::Import {
                file: file.path().to_path_buf(),
            },
            settings.clone(),
        )
        .await
        .unwrap();

        let err = execute(
            Commands::AddExecutable {
                project: "missing".to_string(),
                name: "e".to_string(),
            },
            settings,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
