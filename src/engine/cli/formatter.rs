//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use crate::engine::backup::BackupEntry;
use crate::engine::push::{ConnectionStatus, PushOutcome};
use colored::Colorize;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print the final result of a push attempt
    pub fn outcome(outcome: &PushOutcome) {
        let backup = outcome
            .backup_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        match outcome {
            PushOutcome::Succeeded { status, .. } => {
                Self::success(&format!("Script pushed successfully (Status: {})", status));
                println!("  Backup file: {}", backup);
            }
            PushOutcome::AbortedBeforeWrite { error } => {
                Self::error(&error.to_string());
                Self::info("Remote script was not modified");
            }
            PushOutcome::FailedAndRolledBack { error, .. } => {
                Self::error(&error.to_string());
                Self::warning("Push failed, previous script restored");
                println!("  Backup file: {}", backup);
            }
            PushOutcome::FailedRollbackSkipped { error, .. } => {
                Self::error(&error.to_string());
                Self::warning("Auto-rollback disabled; remote script may contain the failed push");
                Self::recovery_hint(&backup);
            }
            PushOutcome::FailedRollbackAlsoFailed { error, rollback_error, .. } => {
                Self::error(&error.to_string());
                Self::error(&rollback_error.to_string());
                eprintln!(
                    "{}",
                    "Remote script state is UNKNOWN. Manual intervention required."
                        .red()
                        .bold()
                );
                Self::recovery_hint(&backup);
            }
        }
    }

    fn recovery_hint(backup: &str) {
        eprintln!("  {}: {}", "Backup file".red().bold(), backup.bold());
        eprintln!("  Restore with: botpush ... --script {}", backup);
    }

    pub fn connection(status: &ConnectionStatus) {
        match status {
            ConnectionStatus::Healthy { script_len } => {
                Self::success("API connection successful!");
                println!("  Current script: {} chars", script_len);
            }
            ConnectionStatus::Unhealthy { reason } => {
                Self::error(&format!("API connection failed: {}", reason));
            }
        }
    }

    pub fn backups(bot_id: &str, entries: &[(BackupEntry, bool)]) {
        println!("\n{}", format!("Backups for bot {}", bot_id).bright_cyan().bold());
        if entries.is_empty() {
            Self::info("No backups found");
            return;
        }

        for (entry, readable) in entries {
            let row = backup_row(entry, *readable);
            if *readable {
                println!("  {}", row);
            } else {
                println!("  {}", row.red());
            }
        }
    }
}

/// One line of the backup listing
pub fn backup_row(entry: &BackupEntry, readable: bool) -> String {
    format!(
        "{}  {:>8} bytes  {:<10}  {}",
        entry.captured_at.format("%Y-%m-%d %H:%M:%S"),
        entry.size,
        if readable { "readable" } else { "UNREADABLE" },
        entry.path.display()
    )
}
