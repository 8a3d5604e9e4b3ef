use crate::cli::context::Session;
use crate::core::errors::Result;

/// Execute the `backup-cloud target` command.
///
/// Prints the bare location so scripts can capture it.
pub fn execute(session: &Session) -> Result<()> {
    println!(
        "s3://{}/{}",
        session.context.bucket(),
        session.context.target_prefix()
    );
    Ok(())
}
