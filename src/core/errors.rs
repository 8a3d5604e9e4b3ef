use std::io;
use std::path::PathBuf;

/// Signals raised by a byte conduit when one of its ends goes away.
///
/// These are evidence of a failure elsewhere in a pipeline run, not a
/// failure in their own right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConduitError {
    #[error("conduit reader has gone away")]
    ReaderGone,

    #[error("conduit writer is already closed")]
    ConduitClosed,

    #[error("conduit writer aborted before end of stream")]
    WriterAborted,

    #[error("conduit was cancelled")]
    Cancelled,
}

impl ConduitError {
    /// Wrap into an `io::Error` so it can cross `Read`/`Write` boundaries.
    pub fn into_io(self) -> io::Error {
        let kind = match self {
            ConduitError::ReaderGone | ConduitError::ConduitClosed => io::ErrorKind::BrokenPipe,
            ConduitError::WriterAborted => io::ErrorKind::UnexpectedEof,
            ConduitError::Cancelled => io::ErrorKind::ConnectionAborted,
        };
        io::Error::new(kind, self)
    }

    /// Recover a conduit signal from an `io::Error` produced by `into_io`.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<ConduitError>())
            .copied()
    }
}

/// Error categories used to rank failures of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Source,
    Encryption,
    Destination,
    Conduit,
    Io,
}

/// All domain errors for backup-cloud.
///
/// Each variant provides enough context to diagnose the issue
/// without needing a debugger.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(
        "Parameter not found: {name}\n\n  \
         Check that the parameter exists in the [parameters] table of your config\n  \
         or that the --ssm-path points at the right configuration prefix."
    )]
    ParameterNotFound { name: String },

    #[error(
        "No recipients found in keys\n\n  \
         At least one public key must be configured before anything can be encrypted.\n\n  \
         Solutions:\n    \
         → Upload a public key under <s3_path>/config/public-keys/\n    \
         → Or pass explicit recipients: --recipient <uid>"
    )]
    NoRecipients,

    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error(
        "Key without a reasonable identity found: {key}\n\n  \
         Identity '{identity}' must be longer than 3 characters.\n  \
         Fix or remove the key file in the key material folder."
    )]
    InvalidIdentity { key: String, identity: String },

    #[error("Key import failed: {reason}")]
    KeyImportFailed { reason: String },

    #[error("Object not found: s3://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error(
        "Source {object} produced no data\n\n  \
         An empty read is never stored as a backup."
    )]
    EmptySource { object: String },

    #[error("Reading source failed: {reason}")]
    SourceReadFailed { reason: String },

    #[error(
        "Recipient '{identity}' is not in the keyring\n\n  \
         Only keys imported from the key material folder can be used.\n  \
         Run 'backup-cloud recipients' to see the available identities."
    )]
    UnknownRecipient { identity: String },

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Ciphertext sink closed before the encrypted stream was flushed")]
    SinkClosed,

    #[error("Storing s3://{bucket}/{key} failed: {reason}")]
    StoreFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Transient failure storing s3://{bucket}/{key}: {reason}")]
    TransientStore {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Local file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Conduit(#[from] ConduitError),

    #[error("Backup of {source_ref} to {destination} failed: {cause}")]
    RunFailed {
        source_ref: String,
        destination: String,
        cause: Box<BackupError>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackupError {
    /// Taxonomy bucket for this error; run failures report their cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::ParameterNotFound { .. }
            | BackupError::NoRecipients
            | BackupError::InvalidConfig { .. } => ErrorKind::Configuration,
            BackupError::ObjectNotFound { .. }
            | BackupError::AccessDenied { .. }
            | BackupError::EmptySource { .. }
            | BackupError::SourceReadFailed { .. }
            | BackupError::FileNotFound { .. } => ErrorKind::Source,
            BackupError::InvalidIdentity { .. }
            | BackupError::KeyImportFailed { .. }
            | BackupError::UnknownRecipient { .. }
            | BackupError::EncryptionFailed { .. }
            | BackupError::DecryptionFailed { .. }
            | BackupError::SinkClosed => ErrorKind::Encryption,
            BackupError::StoreFailed { .. } | BackupError::TransientStore { .. } => {
                ErrorKind::Destination
            }
            BackupError::Conduit(_) => ErrorKind::Conduit,
            BackupError::RunFailed { cause, .. } => cause.kind(),
            BackupError::Io(e) if ConduitError::from_io(e).is_some() => ErrorKind::Conduit,
            BackupError::Io(_) => ErrorKind::Io,
        }
    }

    /// Innermost cause, unwrapping `RunFailed`.
    pub fn root(&self) -> &BackupError {
        match self {
            BackupError::RunFailed { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// True for errors that only signal a failure elsewhere in a run.
    pub fn is_secondary(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conduit) || matches!(self, BackupError::SinkClosed)
    }

    /// Destination failures have no side effect on the source and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Destination
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackupError>;
