pub mod keyrings;
pub mod object_stores;
pub mod parameters;
