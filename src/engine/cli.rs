//! botpush CLI Module
//! Command-line interface for pushing bot scripts

pub mod formatter;

use crate::engine::config::{ConfigError, PushConfig};
use crate::engine::credentials::CredentialSet;
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "botpush")]
#[command(author = "botpush Team")]
#[command(version)]
#[command(about = "Push Zoho SalesIQ bot scripts with automatic backup and rollback", long_about = None)]
pub struct Cli {
    /// Zoho organization ID
    #[arg(long, env = "BOTPUSH_ORG_ID")]
    pub org_id: String,

    /// OAuth client ID
    #[arg(long, env = "BOTPUSH_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret
    #[arg(long, env = "BOTPUSH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// OAuth refresh token
    #[arg(long, env = "BOTPUSH_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: String,

    /// Bot ID
    #[arg(long, env = "BOTPUSH_BOT_ID")]
    pub bot_id: String,

    /// Path to bot script file
    #[arg(long, required_unless_present_any = ["test", "list_backups"])]
    pub script: Option<PathBuf>,

    /// Test connection only
    #[arg(long, conflicts_with = "list_backups")]
    pub test: bool,

    /// Disable auto-rollback on failure
    #[arg(long)]
    pub no_rollback: bool,

    /// List local backups for the bot and check they are readable
    #[arg(long)]
    pub list_backups: bool,

    /// Config file (defaults to ./botpush.config.json when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backup directory (overrides config)
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// What the invocation should do
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Push(PathBuf),
    TestConnection,
    ListBackups,
}

impl Cli {
    pub fn credentials(&self) -> CredentialSet {
        CredentialSet::new(
            self.org_id.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
            self.refresh_token.clone(),
            self.bot_id.clone(),
        )
    }

    pub fn mode(&self) -> Mode {
        if self.test {
            Mode::TestConnection
        } else if self.list_backups {
            Mode::ListBackups
        } else {
            // clap guarantees --script outside the other modes
            Mode::Push(self.script.clone().unwrap_or_default())
        }
    }

    /// Resolve config: explicit file, else discovery in `cwd`, then flags
    pub fn resolve_config(&self, cwd: &Path) -> Result<PushConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => PushConfig::load(path)?,
            None => PushConfig::discover(cwd)?,
        };

        if let Some(dir) = &self.backup_dir {
            config.backup_dir = dir.clone();
        }
        if self.no_rollback {
            config.auto_rollback = false;
        }

        config.validate()?;
        Ok(config)
    }
}
