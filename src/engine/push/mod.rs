//! botpush Update Orchestrator
//!
//! Backup-first, rollback-safe replacement of a remote bot script.
//!
//! Components:
//! - `state` - Push attempt state machine
//! - `outcome` - Terminal outcomes and step errors
//! - `orchestrator` - The push protocol and connection check

pub mod state;
pub mod outcome;
pub mod orchestrator;

pub use orchestrator::{AttemptContext, ConnectionStatus, ScriptSource, UpdateOrchestrator};
pub use outcome::{ErrorKind, OutcomeKind, PushError, PushOutcome, PushSummary};
pub use state::{AttemptState, AttemptTracker};
