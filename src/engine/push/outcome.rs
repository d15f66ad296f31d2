//! Push outcomes and the step-level error taxonomy

use crate::engine::backup::{BackupRecord, StorageError};
use crate::engine::client::RemoteError;
use crate::engine::push::state::AttemptState;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of one protocol step
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Authentication failed: {0}")]
    Authentication(#[source] RemoteError),
    #[error("Failed to read script file {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Failed to fetch current script: {0}")]
    Fetch(#[source] RemoteError),
    #[error("Backup failed, push aborted: {0}")]
    Backup(#[from] StorageError),
    #[error("Push failed: {0}")]
    Write(#[source] RemoteError),
    #[error("Rollback failed: {0}")]
    Rollback(#[source] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Input,
    Fetch,
    Backup,
    Write,
    Rollback,
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Input { .. } | Self::InvalidInput(_) => ErrorKind::Input,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Backup(_) => ErrorKind::Backup,
            Self::Write(_) => ErrorKind::Write,
            Self::Rollback(_) => ErrorKind::Rollback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    AbortedBeforeWrite,
    FailedAndRolledBack,
    FailedRollbackSkipped,
    FailedRollbackAlsoFailed,
}

/// Terminal result of one push attempt
#[derive(Debug)]
pub enum PushOutcome {
    Succeeded {
        backup: BackupRecord,
        status: u16,
    },
    /// Nothing was written remotely
    AbortedBeforeWrite {
        error: PushError,
    },
    FailedAndRolledBack {
        backup: BackupRecord,
        error: PushError,
    },
    FailedRollbackSkipped {
        backup: BackupRecord,
        error: PushError,
    },
    /// Remote state unknown; restore manually from `backup`
    FailedRollbackAlsoFailed {
        backup: BackupRecord,
        error: PushError,
        rollback_error: PushError,
    },
}

impl PushOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Succeeded { .. } => OutcomeKind::Succeeded,
            Self::AbortedBeforeWrite { .. } => OutcomeKind::AbortedBeforeWrite,
            Self::FailedAndRolledBack { .. } => OutcomeKind::FailedAndRolledBack,
            Self::FailedRollbackSkipped { .. } => OutcomeKind::FailedRollbackSkipped,
            Self::FailedRollbackAlsoFailed { .. } => OutcomeKind::FailedRollbackAlsoFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Backup taken during the attempt, if it got that far
    pub fn backup(&self) -> Option<&BackupRecord> {
        match self {
            Self::AbortedBeforeWrite { .. } => None,
            Self::Succeeded { backup, .. }
            | Self::FailedAndRolledBack { backup, .. }
            | Self::FailedRollbackSkipped { backup, .. }
            | Self::FailedRollbackAlsoFailed { backup, .. } => Some(backup),
        }
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup().map(|b| b.path.as_path())
    }

    /// The error that ended the attempt (the write error after a failed write)
    pub fn error(&self) -> Option<&PushError> {
        match self {
            Self::Succeeded { .. } => None,
            Self::AbortedBeforeWrite { error }
            | Self::FailedAndRolledBack { error, .. }
            | Self::FailedRollbackSkipped { error, .. }
            | Self::FailedRollbackAlsoFailed { error, .. } => Some(error),
        }
    }

    pub fn rollback_error(&self) -> Option<&PushError> {
        match self {
            Self::FailedRollbackAlsoFailed { rollback_error, .. } => Some(rollback_error),
            _ => None,
        }
    }

    /// Whether an operator has to restore the remote script by hand
    pub fn requires_manual_recovery(&self) -> bool {
        matches!(
            self,
            Self::FailedRollbackSkipped { .. } | Self::FailedRollbackAlsoFailed { .. }
        )
    }

    pub fn final_state(&self) -> AttemptState {
        match self {
            Self::Succeeded { .. } => AttemptState::Succeeded,
            Self::AbortedBeforeWrite { .. } => AttemptState::Aborted,
            Self::FailedAndRolledBack { .. } => AttemptState::RolledBack,
            Self::FailedRollbackSkipped { .. } => AttemptState::RollbackSkipped,
            Self::FailedRollbackAlsoFailed { .. } => AttemptState::RollbackFailed,
        }
    }

    pub fn summary(&self) -> PushSummary {
        PushSummary {
            outcome: self.kind(),
            success: self.is_success(),
            error_kind: self.error().map(PushError::kind),
            error: self.error().map(|e| e.to_string()),
            rollback_error: self.rollback_error().map(|e| e.to_string()),
            backup: self.backup().cloned(),
            manual_recovery: self.requires_manual_recovery(),
        }
    }
}

/// Serializable view of an outcome for `--format json`
#[derive(Debug, Clone, Serialize)]
pub struct PushSummary {
    pub outcome: OutcomeKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    pub manual_recovery: bool,
}
