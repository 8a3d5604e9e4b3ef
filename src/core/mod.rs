pub mod conduit;
pub mod errors;
pub mod models;
pub mod services;
pub mod traits;
