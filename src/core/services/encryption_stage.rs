use std::io::{Read, Write};

use crate::core::conduit::{ConduitReader, ConduitWriter};
use crate::core::errors::{BackupError, ConduitError, Result};
use crate::core::models::recipient::{Recipient, RecipientSet};
use crate::core::traits::keyring::KeyRing;

/// Encrypts a plaintext stream for a fixed set of recipients.
pub struct EncryptionStage<'a> {
    keyring: &'a dyn KeyRing,
    recipients: Vec<Recipient>,
}

impl<'a> EncryptionStage<'a> {
    pub fn new(keyring: &'a dyn KeyRing, recipients: &RecipientSet) -> Self {
        Self {
            keyring,
            recipients: recipients.as_vec(),
        }
    }

    /// Encrypt between two plain streams.
    pub fn encrypt(
        &self,
        plaintext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.keyring.encrypt(&self.recipients, plaintext, sink)
    }

    /// Encrypt everything arriving on `plaintext` into `sink`.
    ///
    /// The sink is closed only after the cipher finished cleanly; on any
    /// failure it is aborted so the stage downstream never mistakes a
    /// truncated ciphertext for a complete one. A sink whose reader went
    /// away reports `SinkClosed`.
    pub fn run(&self, mut plaintext: ConduitReader, mut sink: ConduitWriter) -> Result<()> {
        let outcome = self.encrypt(&mut plaintext, &mut sink);
        plaintext.close();

        match outcome {
            Ok(()) => sink.close().map_err(|signal| match signal {
                ConduitError::ReaderGone => BackupError::SinkClosed,
                other => BackupError::Conduit(other),
            }),
            Err(e) => {
                sink.abort();
                let cancelled = matches!(e, BackupError::Conduit(ConduitError::Cancelled));
                let write_failure =
                    e.is_secondary() || matches!(e, BackupError::EncryptionFailed { .. });
                if write_failure && !cancelled && sink.is_reader_gone() {
                    Err(BackupError::SinkClosed)
                } else {
                    Err(e)
                }
            }
        }
    }
}
