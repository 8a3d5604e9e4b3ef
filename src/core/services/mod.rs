pub mod backup_context;
pub mod backup_service;
pub mod encryption_stage;
pub mod keyring_bootstrap;
pub mod pipeline;
