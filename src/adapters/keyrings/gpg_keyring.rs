use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use super::home::KeyRingHome;
use crate::core::errors::{BackupError, ConduitError, Result};
use crate::core::models::recipient::Recipient;
use crate::core::traits::keyring::{KeyListing, KeyRing, keys_for_recipients};

/// GPG keyring that shells out to the system `gpg` binary with its own
/// `--homedir`, so imported keys never touch the user's keyring.
///
/// Requires GPG to be installed on the system. Encryption always uses
/// `--trust-model always` and never signs.
#[derive(Debug)]
pub struct GpgKeyRing {
    /// Path to the gpg binary (defaults to "gpg").
    gpg_path: PathBuf,
    home: KeyRingHome,
}

/// Why a streaming gpg invocation failed.
enum GpgFailure {
    Spawn(io::Error),
    Input(io::Error),
    Output(io::Error),
    Exit(String),
}

impl GpgKeyRing {
    /// Create an empty keyring using the default `gpg` binary.
    pub fn create(retain: bool) -> Result<Self> {
        Self::with_path(PathBuf::from("gpg"), retain)
    }

    /// Create an empty keyring with a custom gpg binary path.
    pub fn with_path(gpg_path: PathBuf, retain: bool) -> Result<Self> {
        Ok(Self {
            gpg_path,
            home: KeyRingHome::create(retain)?,
        })
    }

    /// Check if GPG is available on the system.
    pub fn is_available(gpg_path: &Path) -> bool {
        Command::new(gpg_path)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.gpg_path);
        cmd.arg("--homedir")
            .arg(self.home.path())
            .args(["--batch", "--yes", "--no-tty"]);
        cmd
    }

    /// Run gpg with `input` on stdin, copying stdout into `output` as it is
    /// produced. stdin is fed from a separate thread so neither pipe can
    /// fill up and stall the other.
    fn run_streaming(
        &self,
        args: &[&str],
        input: &mut (dyn Read + Send),
        output: &mut (dyn Write + Send),
    ) -> std::result::Result<(), GpgFailure> {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(GpgFailure::Spawn)?;

        let mut stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let (fed, copied, diagnostics) = thread::scope(|scope| {
            let feeder = scope.spawn(move || -> io::Result<()> {
                if let Some(mut pipe) = stdin.take() {
                    io::copy(input, &mut pipe)?;
                }
                Ok(())
            });
            let collector = scope.spawn(move || {
                let mut text = String::new();
                if let Some(mut pipe) = stderr.take() {
                    let _ = pipe.read_to_string(&mut text);
                }
                text
            });

            let copied = match stdout.as_mut() {
                Some(pipe) => io::copy(pipe, output).and_then(|_| output.flush()),
                None => Ok(()),
            };
            if copied.is_err() {
                kill_quietly(&mut child);
            }
            drop(stdout);

            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin feeder panicked")));
            if fed.is_err() {
                kill_quietly(&mut child);
            }
            let diagnostics = collector.join().unwrap_or_default();
            (fed, copied, diagnostics)
        });

        let status = child.wait().map_err(GpgFailure::Spawn)?;
        copied.map_err(GpgFailure::Output)?;
        fed.map_err(GpgFailure::Input)?;
        if !status.success() {
            return Err(GpgFailure::Exit(diagnostics.trim().to_string()));
        }
        Ok(())
    }

    /// Arguments for `--encrypt`, naming recipients by key id. A bare
    /// `--recipient <uid>` would let gpg do a substring match.
    fn encrypt_args(known: &[KeyListing], recipients: &[Recipient]) -> Result<Vec<String>> {
        let mut args: Vec<String> = ["--encrypt", "--armor", "--trust-model", "always"]
            .map(String::from)
            .into();
        for key in keys_for_recipients(known, recipients, |k| k.uid.as_str())? {
            args.push("--recipient".into());
            args.push(key.key_id.clone());
        }
        Ok(args)
    }

    /// Parse `--with-colons --list-keys` output into the first uid of each key.
    fn parse_colons(listing: &str) -> Vec<KeyListing> {
        let mut keys: Vec<KeyListing> = Vec::new();
        let mut awaiting_uid = false;

        for line in listing.lines() {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.first() {
                Some(&"pub") => {
                    keys.push(KeyListing {
                        key_id: fields.get(4).copied().unwrap_or_default().to_string(),
                        uid: String::new(),
                    });
                    awaiting_uid = true;
                }
                Some(&"uid") if awaiting_uid => {
                    if let Some(key) = keys.last_mut() {
                        key.uid = unescape_colons(fields.get(9).copied().unwrap_or_default());
                    }
                    awaiting_uid = false;
                }
                _ => {}
            }
        }
        keys
    }
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
}

/// gpg escapes `:` and other specials as `\xNN` in colon listings.
fn unescape_colons(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find("\\x") {
        out.push_str(&rest[..pos]);
        let hex = rest.get(pos + 2..pos + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(byte) => {
                out.push(byte as char);
                rest = &rest[pos + 4..];
            }
            None => {
                out.push_str("\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn encrypt_failure(failure: GpgFailure) -> BackupError {
    match failure {
        GpgFailure::Spawn(e) => BackupError::EncryptionFailed {
            reason: format!("Failed to run gpg: {e}"),
        },
        GpgFailure::Input(e) | GpgFailure::Output(e) => match ConduitError::from_io(&e) {
            Some(signal) => BackupError::Conduit(signal),
            None => BackupError::EncryptionFailed {
                reason: format!("gpg stream failed: {e}"),
            },
        },
        GpgFailure::Exit(stderr) => BackupError::EncryptionFailed {
            reason: format!("gpg exited with error: {stderr}"),
        },
    }
}

impl KeyRing for GpgKeyRing {
    fn import_key(&self, material: &[u8]) -> Result<String> {
        let before = self.keys()?;
        let mut input = material;
        let mut discard = io::sink();
        self.run_streaming(&["--import"], &mut input, &mut discard)
            .map_err(|failure| BackupError::KeyImportFailed {
                reason: match failure {
                    GpgFailure::Exit(stderr) => stderr,
                    GpgFailure::Spawn(e) | GpgFailure::Input(e) | GpgFailure::Output(e) => {
                        e.to_string()
                    }
                },
            })?;

        // Re-importing a known key adds nothing new; report the last one then.
        let mut after = self.keys()?;
        let fresh = after
            .iter()
            .position(|k| !before.iter().any(|b| b.key_id == k.key_id));
        let imported = match fresh {
            Some(index) => after.swap_remove(index),
            None => after.pop().ok_or_else(|| BackupError::KeyImportFailed {
                reason: "gpg reported success but the keyring is empty".into(),
            })?,
        };
        Ok(imported.key_id)
    }

    fn keys(&self) -> Result<Vec<KeyListing>> {
        let output = self
            .command()
            .args(["--with-colons", "--list-keys"])
            .output()
            .map_err(|e| BackupError::EncryptionFailed {
                reason: format!("Failed to run gpg: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::EncryptionFailed {
                reason: format!("gpg exited with error: {stderr}"),
            });
        }

        Ok(Self::parse_colons(&String::from_utf8_lossy(&output.stdout)))
    }

    fn encrypt(
        &self,
        recipients: &[Recipient],
        plaintext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        if recipients.is_empty() {
            return Err(BackupError::NoRecipients);
        }
        let known = self.keys()?;
        let args = Self::encrypt_args(&known, recipients)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.run_streaming(&args, plaintext, sink)
            .map_err(encrypt_failure)
    }

    fn decrypt(
        &self,
        ciphertext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.run_streaming(&["--decrypt"], ciphertext, sink)
            .map_err(|failure| BackupError::DecryptionFailed {
                reason: match failure {
                    GpgFailure::Exit(stderr) => stderr,
                    GpgFailure::Spawn(e) | GpgFailure::Input(e) | GpgFailure::Output(e) => {
                        e.to_string()
                    }
                },
            })
    }

    fn home(&self) -> &Path {
        self.home.path()
    }

    fn name(&self) -> &str {
        "gpg"
    }
}
