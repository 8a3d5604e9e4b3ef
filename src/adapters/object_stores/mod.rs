pub mod local_store;
pub mod memory_store;
