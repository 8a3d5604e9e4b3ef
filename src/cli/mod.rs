pub mod commands;
pub mod context;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::app_config::DEFAULT_CONFIG_FILE;
use crate::core::services::backup_context::DEFAULT_CONFIG_PATH;

/// Stream backups into a bucket, encrypted for every configured recipient.
#[derive(Parser, Debug)]
#[command(name = "backup-cloud", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Parameter path holding s3_bucket and s3_path
    #[arg(
        long,
        global = true,
        env = "BACKUP_CLOUD_SSM_PATH",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub ssm_path: String,

    /// Encrypt only for this identity. Repeat for several.
    #[arg(long = "recipient", global = true)]
    pub recipients: Vec<String>,

    /// Keyring backend: age or gpg (overrides the config file)
    #[arg(long, global = true)]
    pub cipher: Option<String>,

    /// Keep the temporary keyring directory after exit
    #[arg(long, global = true)]
    pub keep_keyring: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode: only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up one object from another bucket
    Object {
        /// Bucket holding the object
        src_bucket: String,
        /// Key of the object
        src_key: String,
        /// Name of the backup below the target prefix
        dest_key: String,
    },

    /// Back up one local file
    File {
        /// File to back up
        path: PathBuf,
        /// Name of the backup below the target prefix
        dest_key: String,
    },

    /// Back up every file below a directory
    Upload {
        /// Directory to back up
        dir: PathBuf,
        /// Folder below the target prefix
        dest_path: String,
    },

    /// List the identities backups are encrypted for
    Recipients,

    /// Print where backups are stored
    Target,

    /// Generate a key pair for a new recipient
    Keygen {
        /// Identity of the new key (longer than 3 characters)
        uid: String,
        /// Directory to write <uid>.pub and <uid>.key into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Decrypt a backup with a private key
    Decrypt {
        /// Encrypted backup file
        file: PathBuf,
        /// Private key file
        #[arg(long)]
        identity: PathBuf,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
