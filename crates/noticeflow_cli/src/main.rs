//! Operator entry point for the notice engine.
//!
//! # Responsibility
//! - Apply migrations to a database file.
//! - Run expiry sweeps once or on a fixed period.
//! - Print dashboard rollups as JSON.

use clap::{Parser, Subcommand};
use log::info;
use noticeflow_core::db::migrations::current_user_version;
use noticeflow_core::db::open_db;
use noticeflow_core::{
    core_version, init_from_config, Actor, DepartmentId, EngineConfig, NoticeEngine, Role, UserId,
};
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "noticeflow")]
#[command(about = "Notice distribution and delivery-tracking engine", version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "NOTICEFLOW_DB", default_value = "noticeflow.db")]
    db: PathBuf,

    /// TOML configuration file; defaults apply when it does not exist
    #[arg(long, env = "NOTICEFLOW_CONFIG", default_value = "noticeflow.toml")]
    config: PathBuf,

    /// Absolute directory for rolling log files (overrides config)
    #[arg(long, env = "NOTICEFLOW_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error (overrides config)
    #[arg(long, env = "NOTICEFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the schema
    Migrate,
    /// Archive approved/circulated notices past their expiry
    Sweep {
        /// Keep sweeping every `sweep_interval_secs`
        #[arg(long)]
        watch: bool,
    },
    /// Print dashboard counters
    Dashboard {
        /// Print one department's dashboard instead of global totals
        #[arg(long)]
        department: Option<DepartmentId>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = EngineConfig::load_or_default(&cli.config)?;
    if let Some(log_dir) = cli.log_dir {
        config.logging.dir = Some(log_dir);
    }
    if let Some(log_level) = cli.log_level {
        config.logging.level = Some(log_level);
    }
    init_from_config(&config.logging)?;
    info!(
        "event=cli_start module=cli status=ok version={} db={}",
        core_version(),
        cli.db.display()
    );

    match cli.command {
        Command::Migrate => {
            let conn = open_db(&cli.db)?;
            print_json(&json!({
                "db": cli.db.display().to_string(),
                "schema_version": current_user_version(&conn)?,
            }))
        }
        Command::Sweep { watch } => {
            let interval = Duration::from_secs(config.sweep_interval_secs);
            let engine = NoticeEngine::open(&cli.db, config)?;
            loop {
                let report = engine.sweep_expired()?;
                print_json(&json!(report))?;
                if !watch {
                    return Ok(());
                }
                thread::sleep(interval);
            }
        }
        Command::Dashboard { department } => {
            let engine = NoticeEngine::open(&cli.db, config)?;
            match department {
                Some(department) => {
                    let operator = Actor::new(UserId::nil(), Role::Admin);
                    print_json(&json!(engine.department_dashboard(&operator, department)?))
                }
                None => print_json(&json!(engine.dashboard_totals()?)),
            }
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
