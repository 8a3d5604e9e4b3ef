use std::path::Path;

use crate::cli::context::Session;
use crate::cli::output;
use crate::core::errors::Result;

/// Execute the `backup-cloud upload` command.
///
/// Every file below `dir` becomes one encrypted object; the first failure
/// stops the upload.
pub fn execute(session: &Session, dir: &Path, dest_path: &str) -> Result<()> {
    let pb = output::spinner(&format!("Uploading {}", dir.display()), session.quiet);
    let result = session.service().upload_path(dir, dest_path);
    pb.finish_and_clear();
    let summary = result?;

    if session.quiet {
        return Ok(());
    }
    for report in &summary.runs {
        super::report_run(report, false);
    }
    output::success(&format!(
        "Uploaded {} file(s), {} ciphertext",
        summary.files(),
        output::bytes(summary.ciphertext_bytes())
    ));
    Ok(())
}
