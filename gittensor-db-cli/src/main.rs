//! gittensor-db - inspect and migrate the GitTensor validator database
//!
//! Every subcommand opens the configured database (or `--db`), applies any
//! pending migrations except under `check`, and prints text or JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gittensor_db::db::{check_connection, schema};
use gittensor_db::{Config, Database, MigrationReport};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gittensor-db")]
#[command(about = "Inspect and migrate the GitTensor validator database")]
#[command(version)]
struct Args {
    /// Database file (overrides config and GITTENSOR_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the database can be opened
    Check,
    /// Apply pending schema scripts
    Migrate,
    /// List stored repositories
    Repos,
    /// List stored miners
    Miners,
    /// Show one pull request
    Pr {
        /// Repository as owner/name
        repository: String,
        /// Pull request number
        number: i64,
        /// Include file changes
        #[arg(long)]
        files: bool,
    },
    /// Show the latest evaluation of a miner
    LatestEval {
        uid: u64,
        hotkey: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(db) = args.db.clone() {
        config.database.path = Some(db);
    }

    let _log_guard =
        gittensor_db::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = config.database.resolved_path();
    tracing::info!(path = %db_path.display(), "gittensor-db starting");

    match args.command {
        Command::Check => {
            if !check_connection(&config.database) {
                anyhow::bail!("cannot open database at {}", db_path.display());
            }
            println!("Database OK: {}", db_path.display());
            println!("Log files:   {}", gittensor_db::logging::log_file_pattern().display());
        }
        Command::Migrate => {
            let (_db, report) = open(&config)?;
            if args.format == Format::Json {
                emit_json(&serde_json::json!({
                    "applied": report.applied,
                    "skipped": report.skipped,
                }))?;
            } else if report.is_noop() {
                println!("Schema up to date ({} scripts)", schema::table_names().len());
            } else {
                println!("Applied {} migration(s):", report.applied.len());
                for name in &report.applied {
                    println!("  {}.sql", name);
                }
            }
        }
        Command::Repos => {
            let (db, _) = open(&config)?;
            let repositories = db.repositories().get_all_repositories()?;
            if args.format == Format::Json {
                emit_json(&repositories)?;
            } else if repositories.is_empty() {
                println!("No repositories stored.");
            } else {
                for repository in &repositories {
                    println!("{:<40} {}", repository.full_name(), repository.github_url());
                }
            }
        }
        Command::Miners => {
            let (db, _) = open(&config)?;
            let miners = db.miners().get_all_miners()?;
            if args.format == Format::Json {
                emit_json(&miners)?;
            } else if miners.is_empty() {
                println!("No miners stored.");
            } else {
                for miner in &miners {
                    println!("{}", miner);
                }
            }
        }
        Command::Pr {
            repository,
            number,
            files,
        } => {
            let (db, _) = open(&config)?;
            let prs = db.pull_requests();
            let pr = if files {
                prs.get_pull_request_with_file_changes(number, &repository)?
            } else {
                prs.get_pull_request(number, &repository)?
            };
            let Some(pr) = pr else {
                anyhow::bail!("No pull request {}#{}", repository, number);
            };

            if args.format == Format::Json {
                emit_json(&pr)?;
            } else {
                println!("{} {}", pr.github_url(), pr.title);
                println!("  author:   {}", pr.author_login);
                println!("  merged:   {}", pr.merged_at.to_rfc3339());
                println!("  score:    {:.4}", pr.earned_score);
                println!(
                    "  lines:    +{} -{} ({} commits)",
                    pr.additions, pr.deletions, pr.commits
                );
                if let Some(changes) = &pr.file_changes {
                    println!("  files:    {}", changes.len());
                    for change in changes {
                        println!(
                            "    {:<10} {:>6} {}",
                            change.status.as_str(),
                            change.changes,
                            change.filename
                        );
                    }
                }
            }
        }
        Command::LatestEval { uid, hotkey } => {
            let (db, _) = open(&config)?;
            let Some(evaluation) = db
                .miner_evaluations()
                .get_latest_miner_evaluation(uid, &hotkey)?
            else {
                anyhow::bail!("No evaluation for uid {} ({})", uid, hotkey);
            };

            if args.format == Format::Json {
                emit_json(&evaluation)?;
            } else {
                let timestamp = evaluation
                    .evaluation_timestamp
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("uid {} ({}) at {}", evaluation.uid, evaluation.hotkey, timestamp);
                println!("  score:        {:.4}", evaluation.total_score);
                println!("  prs:          {}", evaluation.total_prs()?);
                println!("  open prs:     {}", evaluation.total_open_prs);
                println!("  lines:        {}", evaluation.total_lines_changed);
                println!("  repositories: {}", evaluation.unique_repos_count);
                if let Some(reason) = &evaluation.failed_reason {
                    println!("  failed:       {}", reason);
                }
            }
        }
    }

    Ok(())
}

/// Open the configured database and bring its schema up to date.
fn open(config: &Config) -> Result<(Database, MigrationReport)> {
    let path = config.database.resolved_path();
    let db = Database::from_config(&config.database)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let report = db.migrate().context("failed to run database migrations")?;
    Ok((db, report))
}

fn emit_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{}", rendered);
    Ok(())
}
