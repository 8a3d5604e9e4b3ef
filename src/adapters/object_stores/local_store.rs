use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::core::errors::{BackupError, Result};
use crate::core::models::object_ref::ObjectRef;
use crate::core::traits::object_store::{ObjectBody, ObjectLister, ObjectSink, ObjectSource};

/// Object store backed by a directory: every bucket is a sub-directory of
/// `root`, every key a relative file path inside it.
///
/// Uploads are written to a temporary file in the bucket directory and
/// renamed into place once the body is complete.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(BackupError::InvalidConfig {
                detail: format!("Invalid bucket name: '{bucket}'"),
            });
        }
        Ok(self.root.join(bucket))
    }

    /// Map an object onto its file, refusing keys that escape the bucket.
    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf> {
        let key = object.key.trim_start_matches('/');
        if key.is_empty() || !is_plain_relative(Path::new(key)) {
            return Err(BackupError::InvalidConfig {
                detail: format!("Invalid object key: '{}'", object.key),
            });
        }
        Ok(self.bucket_dir(&object.bucket)?.join(key))
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl ObjectSource for LocalObjectStore {
    fn open(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let path = self.object_path(object)?;
        match File::open(&path) {
            Ok(file) if path.is_file() => Ok(Box::new(file)),
            Ok(_) => Err(BackupError::ObjectNotFound {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            }),
            Err(e) => Err(match e.kind() {
                io::ErrorKind::NotFound => BackupError::ObjectNotFound {
                    bucket: object.bucket.clone(),
                    key: object.key.clone(),
                },
                io::ErrorKind::PermissionDenied => BackupError::AccessDenied {
                    bucket: object.bucket.clone(),
                    key: object.key.clone(),
                },
                _ => BackupError::Io(e),
            }),
        }
    }
}

impl ObjectSink for LocalObjectStore {
    fn put(&self, object: &ObjectRef, body: &mut dyn Read) -> Result<u64> {
        let bucket_dir = self.bucket_dir(&object.bucket)?;
        if !bucket_dir.is_dir() {
            return Err(BackupError::StoreFailed {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                reason: "no such bucket".into(),
            });
        }

        let path = self.object_path(object)?;
        let mut staged = tempfile::NamedTempFile::new_in(&bucket_dir)
            .map_err(|e| store_failure(object, &e))?;
        let size = io::copy(body, staged.as_file_mut())?;

        // Key prefix directories appear only once the body is complete.
        let parent = path.parent().unwrap_or(&bucket_dir);
        std::fs::create_dir_all(parent).map_err(|e| store_failure(object, &e))?;
        staged
            .persist(&path)
            .map_err(|e| store_failure(object, &e.error))?;
        Ok(size)
    }
}

fn store_failure(object: &ObjectRef, err: &io::Error) -> BackupError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => BackupError::AccessDenied {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
        },
        _ => BackupError::StoreFailed {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            reason: err.to_string(),
        },
    }
}

impl ObjectLister for LocalObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&bucket_dir).follow_links(false) {
            let entry = entry.map_err(|e| BackupError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // In-flight uploads are hidden temp files
            if key.rsplit('/').next().is_some_and(|name| name.starts_with(".tmp")) {
                continue;
            }
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Reads local files as pipeline sources; the object key is the file path.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

impl ObjectSource for LocalFileSource {
    fn open(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let path = PathBuf::from(&object.key);
        if !path.is_file() {
            return Err(BackupError::FileNotFound { path });
        }
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => BackupError::AccessDenied {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            },
            _ => BackupError::SourceReadFailed {
                reason: format!("{}: {e}", path.display()),
            },
        })?;
        Ok(Box::new(file))
    }
}
