use std::collections::BTreeSet;
use std::fmt;

use crate::core::errors::{BackupError, Result};

/// Identities must be strictly longer than this to be usable.
pub const MIN_IDENTITY_LEN: usize = 3;

/// An identity (primary user id of a public key) that encrypted
/// material must be decryptable by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Recipient(String);

impl Recipient {
    /// Validate an identity string taken from a key.
    ///
    /// `key` names the key the identity came from and only feeds the error.
    pub fn parse(identity: &str, key: &str) -> Result<Self> {
        let identity = identity.trim();
        if identity.chars().count() <= MIN_IDENTITY_LEN {
            return Err(BackupError::InvalidIdentity {
                key: key.to_string(),
                identity: identity.to_string(),
            });
        }
        Ok(Self(identity.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identities a backup is encrypted for. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientSet {
    members: BTreeSet<Recipient>,
}

impl RecipientSet {
    /// Build a set, failing with `NoRecipients` when nothing is supplied.
    pub fn new(recipients: impl IntoIterator<Item = Recipient>) -> Result<Self> {
        let members: BTreeSet<_> = recipients.into_iter().collect();
        if members.is_empty() {
            return Err(BackupError::NoRecipients);
        }
        Ok(Self { members })
    }

    /// Build a set from caller-supplied identity strings.
    pub fn explicit<S: AsRef<str>>(identities: &[S]) -> Result<Self> {
        let parsed = identities
            .iter()
            .map(|id| Recipient::parse(id.as_ref(), "explicit recipient"))
            .collect::<Result<Vec<_>>>()?;
        Self::new(parsed)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.iter().any(|r| r.as_str() == identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.members.iter()
    }

    pub fn as_vec(&self) -> Vec<Recipient> {
        self.members.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a Recipient;
    type IntoIter = std::collections::btree_set::Iter<'a, Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}
