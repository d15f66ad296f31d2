//! Update Orchestrator
//!
//! Runs one push attempt: load, authenticate, fetch, back up, write, and
//! roll back on failure. The write is never issued without a durable backup
//! of the script it replaces.

use crate::engine::backup::{BackupRecord, BackupStore};
use crate::engine::client::{RemoteError, ScriptClient};
use crate::engine::config::PushConfig;
use crate::engine::credentials::{BearerToken, CredentialSet};
use crate::engine::push::outcome::{PushError, PushOutcome};
use crate::engine::push::state::{AttemptState, AttemptTracker};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Where the new script comes from
#[derive(Debug, Clone)]
pub enum ScriptSource {
    File(PathBuf),
    Inline(String),
}

impl ScriptSource {
    pub fn load(&self) -> Result<String, PushError> {
        match self {
            Self::File(path) => std::fs::read_to_string(path).map_err(|source| PushError::Input {
                path: path.clone(),
                source,
            }),
            Self::Inline(content) => Ok(content.clone()),
        }
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Inline(content) => write!(f, "<inline, {} chars>", content.chars().count()),
        }
    }
}

impl From<&Path> for ScriptSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

/// Immutable per-run context. Every authenticated call in an attempt reads
/// the same token.
#[derive(Debug)]
pub struct AttemptContext {
    pub bot_id: String,
    token: BearerToken,
}

impl AttemptContext {
    pub fn token(&self) -> &BearerToken {
        &self.token
    }
}

/// Result of the non-mutating health check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Healthy { script_len: usize },
    Unhealthy { reason: String },
}

impl ConnectionStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Everything in hand once the backup is durable
struct ReadyToWrite {
    context: AttemptContext,
    new_script: String,
    backup: BackupRecord,
}

pub struct UpdateOrchestrator {
    client: ScriptClient,
    backup_dir: PathBuf,
    auto_rollback: bool,
}

impl UpdateOrchestrator {
    pub fn new(config: &PushConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: ScriptClient::new(config)?,
            backup_dir: config.backup_dir.clone(),
            auto_rollback: config.auto_rollback,
        })
    }

    /// Push `source` as the new script for `target_id`.
    ///
    /// Always returns exactly one terminal outcome.
    pub async fn push(
        &self,
        credentials: &CredentialSet,
        target_id: &str,
        source: &ScriptSource,
    ) -> PushOutcome {
        let mut attempt = AttemptTracker::new(target_id);

        let outcome = match self.prepare(credentials, target_id, source, &mut attempt).await {
            Ok(ready) => self.write(ready, &mut attempt).await,
            Err(error) => {
                record(&mut attempt, AttemptState::Aborted);
                error!(target_id, kind = ?error.kind(), "Push aborted before write: {}", error);
                PushOutcome::AbortedBeforeWrite { error }
            }
        };

        debug!(target_id, states = ?attempt.history(), "Attempt finished");
        outcome
    }

    /// Every step up to and including the backup. Nothing here mutates
    /// remote state.
    async fn prepare(
        &self,
        credentials: &CredentialSet,
        target_id: &str,
        source: &ScriptSource,
        attempt: &mut AttemptTracker,
    ) -> Result<ReadyToWrite, PushError> {
        validate_bot_id(target_id)?;

        info!(%source, "Reading new script");
        let new_script = source.load()?;
        info!(chars = new_script.chars().count(), "Script loaded");

        let context = self.authenticate(credentials, target_id).await?;
        record(attempt, AttemptState::Authenticated);

        let prior = self.fetch_current(&context).await?;
        record(attempt, AttemptState::Fetched);

        let backup = BackupStore::open(&self.backup_dir)
            .and_then(|store| store.capture(target_id, &prior))?;
        record(attempt, AttemptState::BackedUp);

        Ok(ReadyToWrite {
            context,
            new_script,
            backup,
        })
    }

    async fn authenticate(
        &self,
        credentials: &CredentialSet,
        target_id: &str,
    ) -> Result<AttemptContext, PushError> {
        info!(org_id = %credentials.org_id, "Refreshing OAuth access token");
        let token = self
            .client
            .exchange_refresh_token(credentials)
            .await
            .map_err(PushError::Authentication)?;
        info!("Token refreshed successfully");

        Ok(AttemptContext {
            bot_id: target_id.to_string(),
            token,
        })
    }

    async fn fetch_current(&self, context: &AttemptContext) -> Result<String, PushError> {
        info!(bot_id = %context.bot_id, "Retrieving current bot script");
        let script = self
            .client
            .fetch_script(&context.token, &context.bot_id)
            .await
            .map_err(PushError::Fetch)?;
        info!(chars = script.chars().count(), "Current script retrieved");
        Ok(script)
    }

    async fn write(&self, ready: ReadyToWrite, attempt: &mut AttemptTracker) -> PushOutcome {
        let ReadyToWrite { context, new_script, backup } = ready;

        info!(bot_id = %context.bot_id, "Pushing updated script");
        let write_result = self
            .client
            .put_script(&context.token, &context.bot_id, &new_script)
            .await;

        let error = match write_result {
            Ok(status) => {
                record(attempt, AttemptState::Succeeded);
                info!(status, backup = %backup.path.display(), "Script pushed successfully");
                return PushOutcome::Succeeded { backup, status };
            }
            Err(e) => PushError::Write(e),
        };

        record(attempt, AttemptState::WriteFailed);
        error!(bot_id = %context.bot_id, "{}", error);

        if !self.auto_rollback {
            record(attempt, AttemptState::RollbackSkipped);
            warn!(backup = %backup.path.display(), "Auto-rollback disabled, restore manually from backup");
            return PushOutcome::FailedRollbackSkipped { backup, error };
        }

        warn!(backup = %backup.path.display(), "Attempting rollback");
        match self.rollback(&context, &backup).await {
            Ok(()) => {
                record(attempt, AttemptState::RolledBack);
                info!("Rollback successful");
                PushOutcome::FailedAndRolledBack { backup, error }
            }
            Err(rollback_error) => {
                record(attempt, AttemptState::RollbackFailed);
                error!(
                    backup = %backup.path.display(),
                    "{}; remote script state is unknown, restore manually from backup",
                    rollback_error
                );
                PushOutcome::FailedRollbackAlsoFailed {
                    backup,
                    error,
                    rollback_error,
                }
            }
        }
    }

    /// Re-send the captured script with the token from this attempt
    async fn rollback(&self, context: &AttemptContext, backup: &BackupRecord) -> Result<(), PushError> {
        self.client
            .put_script(&context.token, &context.bot_id, &backup.content)
            .await
            .map(|_| ())
            .map_err(PushError::Rollback)
    }

    /// Authenticate and fetch only. Never backs up or writes.
    pub async fn check_connection(&self, credentials: &CredentialSet) -> ConnectionStatus {
        info!("Testing API connection");

        match self.read_current(credentials).await {
            Ok(script) => {
                info!("API connection successful");
                ConnectionStatus::Healthy {
                    script_len: script.chars().count(),
                }
            }
            Err(e) => {
                error!("API connection failed: {}", e);
                ConnectionStatus::Unhealthy {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn read_current(&self, credentials: &CredentialSet) -> Result<String, PushError> {
        validate_bot_id(&credentials.bot_id)?;
        let context = self.authenticate(credentials, &credentials.bot_id).await?;
        self.fetch_current(&context).await
    }

    pub async fn test_connection(&self, credentials: &CredentialSet) -> bool {
        self.check_connection(credentials).await.is_healthy()
    }
}

/// The bot id becomes a URL path segment and part of backup file names
fn validate_bot_id(bot_id: &str) -> Result<(), PushError> {
    if bot_id.trim().is_empty() {
        return Err(PushError::InvalidInput("bot id must not be empty".to_string()));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !bot_id.chars().all(allowed) || bot_id.contains("..") {
        return Err(PushError::InvalidInput(format!(
            "bot id `{}` may only contain ASCII letters, digits, '-', '_' and '.'",
            bot_id
        )));
    }
    Ok(())
}

fn record(attempt: &mut AttemptTracker, next: AttemptState) {
    if let Err(e) = attempt.advance(next) {
        error!("{}", e);
    }
}
