use std::path::Path;

use crate::cli::context::Session;
use crate::cli::output;
use crate::core::errors::Result;

/// Execute the `backup-cloud file` command.
pub fn execute(session: &Session, path: &Path, dest_key: &str) -> Result<()> {
    let pb = output::spinner(&format!("Encrypting {}", path.display()), session.quiet);
    let result = session.service().backup_file(path, dest_key);
    pb.finish_and_clear();

    super::report_run(&result?, session.quiet);
    Ok(())
}
