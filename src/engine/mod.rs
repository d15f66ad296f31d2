// botpush Engine - Core module structure
pub mod config;
pub mod credentials;
pub mod client;
pub mod backup;
pub mod push;
pub mod cli;

pub use config::PushConfig;
pub use credentials::CredentialSet;
pub use backup::{BackupRecord, BackupStore};
pub use push::{PushOutcome, UpdateOrchestrator};
