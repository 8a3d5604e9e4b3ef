use crate::cli::context::Session;
use crate::cli::output;
use crate::core::errors::Result;

/// Execute the `backup-cloud object` command.
pub fn execute(
    session: &Session,
    src_bucket: &str,
    src_key: &str,
    dest_key: &str,
) -> Result<()> {
    let pb = output::spinner(
        &format!("Encrypting s3://{src_bucket}/{src_key}"),
        session.quiet,
    );
    let result = session.service().backup_object(src_bucket, src_key, dest_key);
    pb.finish_and_clear();

    super::report_run(&result?, session.quiet);
    Ok(())
}
