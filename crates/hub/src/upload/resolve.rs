// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of untrusted upload paths into a per-agent directory.
//!
//! The sanitising passes only shape the string into something sensible on
//! this host. Containment is decided solely by the normalised,
//! component-wise prefix check in [`resolve`] (and by the symlink-aware
//! re-check performed when a file is placed).

use std::path::{Component, Path, PathBuf};

use super::UploadError;

/// Characters replaced with [`PLACEHOLDER`] in sanitised paths.
const ILLEGAL: &[char] = &['<', '>', '"', '|', '?', '*'];

const PLACEHOLDER: char = '_';

/// Upper bound on a hostname label, in bytes.
const MAX_LABEL_LEN: usize = 255;

/// Check that an agent-declared hostname is usable as one directory name.
pub fn validate_hostname(label: &str) -> Result<&str, UploadError> {
    let bad = label.is_empty()
        || label.len() > MAX_LABEL_LEN
        || label.starts_with('.')
        || label.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if bad {
        return Err(UploadError::InvalidHostname(label.to_owned()));
    }
    Ok(label)
}

/// Turn an untrusted, possibly foreign-platform path into a relative path.
///
/// Steps, in order: strip a drive prefix (`C:`), strip leading separators,
/// convert backslashes, drop `..` segments, drop colons, and replace
/// illegal or control characters.
pub fn sanitize_relative(untrusted: &str) -> String {
    let mut rest = untrusted;

    let bytes = rest.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        rest = &rest[2..];
    }

    let rest = rest.trim_start_matches(['/', '\\']).replace('\\', "/");

    let rest = rest.split('/').filter(|seg| *seg != "..").collect::<Vec<_>>().join("/");

    rest.chars()
        .filter(|c| *c != ':')
        .map(|c| if ILLEGAL.contains(&c) || c.is_control() { PLACEHOLDER } else { c })
        .collect()
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above a root; in a relative path, leading `..`
/// components are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Directory owning every upload from `hostname`.
pub fn agent_root(root: &Path, hostname: &str) -> Result<PathBuf, UploadError> {
    let hostname = validate_hostname(hostname)?;
    Ok(normalize(&root.join(hostname)))
}

/// Resolve `untrusted` to a path strictly below `root/hostname`.
pub fn resolve(root: &Path, hostname: &str, untrusted: &str) -> Result<PathBuf, UploadError> {
    let base = agent_root(root, hostname)?;
    let relative = sanitize_relative(untrusted);
    let target = normalize(&base.join(&relative));
    ensure_within(&base, &target)?;
    Ok(target)
}

/// Fail unless `target` is a strict descendant of `base`, compared by
/// path components.
pub fn ensure_within(base: &Path, target: &Path) -> Result<(), UploadError> {
    if target == base {
        return Err(UploadError::EmptyPath);
    }
    if !target.starts_with(base) {
        return Err(UploadError::PathTraversal(target.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
