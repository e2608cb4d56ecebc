// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent file uploads: path resolution, staging, and placement.

pub mod resolve;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::HubError;

pub use store::{StagedFile, UploadStore};

/// Why a single file could not be placed.
#[derive(Debug)]
pub enum UploadError {
    /// The resolved location is outside the agent's directory.
    PathTraversal(PathBuf),
    /// The path names the agent directory itself.
    EmptyPath,
    /// The declared hostname cannot be used as a directory name.
    InvalidHostname(String),
    Io(std::io::Error),
}

impl UploadError {
    pub fn code(&self) -> HubError {
        match self {
            Self::PathTraversal(_) => HubError::PathTraversal,
            Self::EmptyPath | Self::InvalidHostname(_) => HubError::BadRequest,
            Self::Io(_) => HubError::IoFailure,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathTraversal(path) => write!(f, "Path traversal detected: {}", path.display()),
            Self::EmptyPath => f.write_str("target path is empty"),
            Self::InvalidHostname(label) => write!(f, "invalid hostname label: {label:?}"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result record for one file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Saved {
        original: String,
        #[serde(rename = "savedTo")]
        saved_to: String,
    },
    Failed {
        original: String,
        error: String,
    },
}

impl FileOutcome {
    pub fn original(&self) -> &str {
        match self {
            Self::Saved { original, .. } | Self::Failed { original, .. } => original,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}
