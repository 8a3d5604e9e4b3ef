pub mod memory_parameters;
