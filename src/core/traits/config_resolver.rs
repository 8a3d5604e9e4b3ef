use crate::core::errors::Result;

/// Port for named configuration lookup (an SSM-style parameter store).
pub trait ConfigResolver: Send + Sync {
    /// Resolve `name` to its value; fails with `ParameterNotFound` if absent.
    fn get(&self, name: &str) -> Result<String>;
}
