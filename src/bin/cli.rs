//! botpush CLI - Main entry point for CLI binary
//!
//! Pushes a bot script with a backup taken first and rollback on failure.

use anyhow::Context;
use botpush_lib::engine::{
    backup::BackupStore,
    cli::{formatter::CliFormatter, Cli, Mode, OutputFormat},
    config::PushConfig,
    push::{ScriptSource, UpdateOrchestrator},
};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let code = match run_cli(cli) {
        Ok(code) => code,
        Err(e) => {
            CliFormatter::error(&format!("Error: {:#}", e));
            1
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .context("failed to initialise logging")?;
    Ok(())
}

fn run_cli(cli: Cli) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let config = cli.resolve_config(&cwd).context("failed to load configuration")?;
    let json_output = cli.format == OutputFormat::Json;

    match cli.mode() {
        Mode::Push(script) => cmd_push(&cli, &config, &script, json_output),
        Mode::TestConnection => cmd_test(&cli, &config, json_output),
        Mode::ListBackups => cmd_list_backups(&cli.bot_id, &config, json_output),
    }
}

#[tokio::main]
async fn cmd_push(cli: &Cli, config: &PushConfig, script: &Path, json: bool) -> anyhow::Result<i32> {
    let orchestrator = UpdateOrchestrator::new(config).context("failed to build HTTP client")?;
    let credentials = cli.credentials();

    let outcome = orchestrator
        .push(&credentials, &cli.bot_id, &ScriptSource::from(script))
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
    } else {
        CliFormatter::outcome(&outcome);
    }

    Ok(outcome.exit_code())
}

#[tokio::main]
async fn cmd_test(cli: &Cli, config: &PushConfig, json: bool) -> anyhow::Result<i32> {
    let orchestrator = UpdateOrchestrator::new(config).context("failed to build HTTP client")?;
    let status = orchestrator.check_connection(&cli.credentials()).await;

    if json {
        println!("{}", serde_json::json!({
            "healthy": status.is_healthy(),
            "connection": status,
        }));
    } else {
        CliFormatter::connection(&status);
    }

    Ok(if status.is_healthy() { 0 } else { 1 })
}

fn cmd_list_backups(bot_id: &str, config: &PushConfig, json: bool) -> anyhow::Result<i32> {
    if !config.backup_dir.exists() {
        if json {
            println!("{}", serde_json::json!({ "backups": [] }));
        } else {
            CliFormatter::info(&format!("No backup directory at {}", config.backup_dir.display()));
        }
        return Ok(0);
    }

    let store = BackupStore::open(&config.backup_dir)?;
    let entries: Vec<_> = store
        .list(bot_id)?
        .into_iter()
        .map(|entry| {
            let readable = store.read(&entry.path).is_ok();
            (entry, readable)
        })
        .collect();

    if json {
        let backups: Vec<_> = entries
            .iter()
            .map(|(entry, readable)| {
                serde_json::json!({
                    "path": entry.path.display().to_string(),
                    "captured_at": entry.captured_at.to_rfc3339(),
                    "size": entry.size,
                    "readable": readable,
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "backups": backups }));
    } else {
        CliFormatter::backups(bot_id, &entries);
    }

    Ok(0)
}
