pub mod config_resolver;
pub mod keyring;
pub mod object_store;
