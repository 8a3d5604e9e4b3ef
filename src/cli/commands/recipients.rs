use crate::cli::context::Session;
use crate::cli::output;
use crate::core::errors::Result;

/// Execute the `backup-cloud recipients` command.
pub fn execute(session: &Session) -> Result<()> {
    let context = &session.context;
    let recipients = context.recipients();

    output::header(&format!(
        "Recipients ({}) from s3://{}/{}",
        recipients.len(),
        context.bucket(),
        context.key_material_prefix()
    ));
    let keys = context.keyring().keys()?;
    for recipient in recipients {
        println!("  {recipient}");
        let shared = keys.iter().filter(|k| k.uid.trim() == recipient.as_str()).count();
        if shared > 1 {
            output::warning(&format!(
                "{recipient} is held by {shared} keys; all of them can decrypt"
            ));
        }
    }

    let ignored: Vec<_> = context
        .discovered_recipients()
        .iter()
        .filter(|r| !recipients.contains(r.as_str()))
        .collect();
    if !ignored.is_empty() {
        output::detail(&format!(
            "{} discovered key(s) not selected by --recipient",
            ignored.len()
        ));
    }
    Ok(())
}
