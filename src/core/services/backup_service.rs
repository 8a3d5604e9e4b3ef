use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::backup_context::BackupContext;
use super::pipeline::{Pipeline, PipelineOptions, RunReport};
use crate::adapters::object_stores::local_store::LocalFileSource;
use crate::core::errors::{BackupError, Result};
use crate::core::models::object_ref::{ObjectRef, join_key};
use crate::core::traits::object_store::ObjectStore;

/// Outcome of uploading a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub runs: Vec<RunReport>,
}

impl UploadSummary {
    pub fn files(&self) -> usize {
        self.runs.len()
    }

    pub fn plaintext_bytes(&self) -> u64 {
        self.runs.iter().map(|r| r.plaintext_bytes).sum()
    }

    pub fn ciphertext_bytes(&self) -> u64 {
        self.runs.iter().map(|r| r.ciphertext_bytes).sum()
    }
}

/// Backs up objects, local files and directory trees into the backup
/// folder of a context.
pub struct BackupService<'a, S: ObjectStore> {
    pub context: &'a BackupContext,
    pub store: &'a S,
    pub options: PipelineOptions,
}

impl<'a, S: ObjectStore> BackupService<'a, S> {
    pub fn new(context: &'a BackupContext, store: &'a S) -> Self {
        Self {
            context,
            store,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Encrypt `s3://<src_bucket>/<src_key>` into `<target>/<dest_path>`.
    pub fn backup_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_path: &str,
    ) -> Result<RunReport> {
        let source = ObjectRef::new(src_bucket, src_key);
        let destination = self.context.destination_for(dest_path);
        Pipeline::for_context(self.context, self.store, self.store)
            .with_options(self.options)
            .run(&source, &destination)
    }

    /// Encrypt a local file into `<target>/<dest_path>`.
    pub fn backup_file(&self, path: &Path, dest_path: &str) -> Result<RunReport> {
        let source = ObjectRef::file(path.to_string_lossy());
        let destination = self.context.destination_for(dest_path);
        Pipeline::for_context(self.context, &LocalFileSource, self.store)
            .with_options(self.options)
            .run(&source, &destination)
    }

    /// Encrypt every file below `src_dir`, one object per file.
    ///
    /// `photos/2026/a.jpg` uploaded with `dest_path` `media` lands at
    /// `<target>/media/photos/2026/a.jpg`: the directory's own name is kept.
    /// Stops at the first failing file.
    pub fn upload_path(&self, src_dir: &Path, dest_path: &str) -> Result<UploadSummary> {
        let mut summary = UploadSummary::default();
        for (file, key) in upload_plan(src_dir, dest_path)? {
            let destination = self.context.destination_for(&key);
            let source = ObjectRef::file(file.to_string_lossy());
            let report = Pipeline::for_context(self.context, &LocalFileSource, self.store)
                .with_options(self.options)
                .run(&source, &destination)?;
            summary.runs.push(report);
        }
        tracing::info!(
            dir = %src_dir.display(),
            files = summary.files(),
            "directory uploaded"
        );
        Ok(summary)
    }
}

/// Pair every file below `src_dir` with its key relative to the target
/// prefix, in file name order.
pub fn upload_plan(src_dir: &Path, dest_path: &str) -> Result<Vec<(PathBuf, String)>> {
    if !src_dir.is_dir() {
        return Err(BackupError::InvalidConfig {
            detail: format!(
                "upload_path() can only handle directories: {}",
                src_dir.display()
            ),
        });
    }

    let root = src_dir.canonicalize()?;
    let base = root.parent().unwrap_or(&root);

    let mut plan = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|e| BackupError::SourceReadFailed {
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(base) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        plan.push((entry.path().to_path_buf(), join_key(&[dest_path, &rel])));
    }
    Ok(plan)
}
