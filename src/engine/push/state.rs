//! Push Attempt State Machine
//!
//! One push attempt moves through explicit states so that no step can run
//! out of order. A destructive write is only reachable from `BackedUp`.

use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Position of an attempt in the push protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Start,
    Authenticated,
    Fetched,
    BackedUp,
    /// Terminal: new script accepted
    Succeeded,
    WriteFailed,
    /// Terminal: write failed, prior script restored
    RolledBack,
    /// Terminal: write and restore both failed
    RollbackFailed,
    /// Terminal: write failed, restore disabled by caller
    RollbackSkipped,
    /// Terminal: failed before any remote mutation
    Aborted,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::RolledBack | Self::RollbackFailed | Self::RollbackSkipped | Self::Aborted
        )
    }

    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Start, Authenticated)
                | (Authenticated, Fetched)
                | (Fetched, BackedUp)
                | (BackedUp, Succeeded)
                | (BackedUp, WriteFailed)
                | (WriteFailed, RolledBack)
                | (WriteFailed, RollbackFailed)
                | (WriteFailed, RollbackSkipped)
                | (Start, Aborted)
                | (Authenticated, Aborted)
                | (Fetched, Aborted)
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Authenticated => "AUTHENTICATED",
            Self::Fetched => "FETCHED",
            Self::BackedUp => "BACKED_UP",
            Self::Succeeded => "SUCCEEDED",
            Self::WriteFailed => "WRITE_FAILED",
            Self::RolledBack => "ROLLED_BACK",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackSkipped => "ROLLBACK_SKIPPED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: AttemptState,
    pub to: AttemptState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal attempt transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Tracks the states visited by one attempt
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    target_id: String,
    history: Vec<AttemptState>,
}

impl AttemptTracker {
    pub fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            history: vec![AttemptState::Start],
        }
    }

    pub fn current(&self) -> AttemptState {
        self.history.last().copied().unwrap_or(AttemptState::Start)
    }

    pub fn history(&self) -> &[AttemptState] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the protocol does not allow
    pub fn advance(&mut self, next: AttemptState) -> Result<(), TransitionError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        debug!(target_id = %self.target_id, %from, to = %next, "Attempt state changed");
        self.history.push(next);
        Ok(())
    }
}
