//! Streaming encrypted backups into object storage.
//!
//! A [`core::services::backup_context::BackupContext`] resolves where
//! backups go and bootstraps a keyring with every recipient key found in
//! the bucket. A [`core::services::pipeline::Pipeline`] then streams one
//! object at a time through encryption into the destination, without ever
//! holding the whole object in memory.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
