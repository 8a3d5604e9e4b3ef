use std::fmt;

/// Location of one object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// A local file, addressed by path with no bucket.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new("", path)
    }

    pub fn is_file(&self) -> bool {
        self.bucket.is_empty()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.key)
        }
    }
}

/// Join path segments with exactly one `/` between them.
///
/// Empty segments are dropped, so a blank base path never yields a
/// leading slash and a trailing slash never yields `//`.
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_never_doubles_slashes() {
        assert_eq!(
            join_key(&["unit/test/fake/s3/path/with/slash/", "backup"]),
            "unit/test/fake/s3/path/with/slash/backup"
        );
        assert_eq!(
            join_key(&["unit/test/fake/s3/path/without/slash", "backup"]),
            "unit/test/fake/s3/path/without/slash/backup"
        );
        assert_eq!(join_key(&["", "backup"]), "backup");
    }

    #[test]
    fn display_is_s3_url() {
        assert_eq!(ObjectRef::new("b", "x/y").to_string(), "s3://b/x/y");
        assert_eq!(ObjectRef::file("/tmp/dump.sql").to_string(), "/tmp/dump.sql");
    }
}
