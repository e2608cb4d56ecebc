// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging and placement of uploaded files under the upload root.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::resolve::{agent_root, resolve};
use super::{FileOutcome, UploadError};

/// A received file waiting in the staging directory.
///
/// The staged copy is deleted on drop unless it was placed.
#[derive(Debug)]
pub struct StagedFile {
    original: String,
    path: TempPath,
}

impl StagedFile {
    /// Client-supplied file name, reduced to its last component.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owner of the upload root and its staging directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    staging: PathBuf,
}

impl UploadStore {
    pub fn new(root: PathBuf, staging: PathBuf) -> Self {
        Self { root, staging }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Create the root and staging directories.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::create_dir_all(&self.staging).await
    }

    /// Create an empty staged file and open it for writing.
    pub fn stage(&self, file_name: &str) -> std::io::Result<(StagedFile, tokio::fs::File)> {
        let named = tempfile::Builder::new().prefix("upload-").tempfile_in(&self.staging)?;
        let (file, path) = named.into_parts();
        let staged = StagedFile { original: base_name(file_name), path };
        Ok((staged, tokio::fs::File::from_std(file)))
    }

    /// Move `staged` to its resolved location under `hostname`'s directory.
    ///
    /// An absent or empty `save_path` falls back to the original file name.
    /// Nothing is moved when resolution or the containment checks fail.
    pub async fn place(
        &self,
        hostname: &str,
        staged: StagedFile,
        save_path: Option<&str>,
    ) -> Result<PathBuf, UploadError> {
        let requested = save_path.filter(|p| !p.is_empty()).unwrap_or(staged.original.as_str());
        let target = resolve(&self.root, hostname, requested)?;
        let base = agent_root(&self.root, hostname)?;

        if let Some(parent) = target.parent() {
            prepare_parent(&base, parent).await?;
        }

        // Same-volume rename: the destination never holds a partial file.
        staged.path.persist(&target).map_err(|e| UploadError::Io(e.error))?;
        Ok(target)
    }

    /// Place every file of a batch; entry `i` of `save_paths` belongs to file `i`.
    /// A failure is recorded in that file's outcome and never stops the rest.
    pub async fn place_batch(
        &self,
        hostname: &str,
        files: Vec<StagedFile>,
        save_paths: &[String],
    ) -> Vec<FileOutcome> {
        let total = files.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, staged) in files.into_iter().enumerate() {
            let original = staged.original.clone();
            let save_path = save_paths.get(idx).map(String::as_str);
            match self.place(hostname, staged, save_path).await {
                Ok(path) => {
                    tracing::debug!(hostname, file = idx + 1, total, path = %path.display(), "upload placed");
                    outcomes.push(FileOutcome::Saved { original, saved_to: path.display().to_string() });
                }
                Err(e) => {
                    tracing::warn!(hostname, file = idx + 1, total, original = %original, err = %e, "upload failed");
                    outcomes.push(FileOutcome::Failed { original, error: e.to_string() });
                }
            }
        }
        outcomes
    }
}

/// Create `parent` below `base`, refusing when an existing ancestor resolves
/// (through symlinks) outside `base`.
async fn prepare_parent(base: &Path, parent: &Path) -> Result<(), UploadError> {
    tokio::fs::create_dir_all(base).await?;
    let real_base = tokio::fs::canonicalize(base).await?;

    let mut existing = parent;
    while tokio::fs::symlink_metadata(existing).await.is_err() {
        match existing.parent() {
            Some(up) => existing = up,
            None => break,
        }
    }
    let real = tokio::fs::canonicalize(existing).await?;
    if !real.starts_with(&real_base) {
        return Err(UploadError::PathTraversal(real));
    }

    tokio::fs::create_dir_all(parent).await?;
    Ok(())
}

/// Last path component of a client file name, accepting either separator.
fn base_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    if last.is_empty() || last == "." || last == ".." {
        "upload".to_owned()
    } else {
        last.to_owned()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
