//! botpush - Backup-first, rollback-safe bot script updates
//! Library behind the `botpush` CLI

pub mod engine;
