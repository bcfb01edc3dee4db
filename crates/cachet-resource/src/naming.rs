//! Canonical file paths for resources and targets.
//!
//! A resource lives at `location/name.ext`; a target embeds its content hash
//! as `location/name-<hash>.ext`. Both are pure functions of their inputs and
//! never touch the filesystem.

use crate::types::DataHash;
use std::path::{Path, PathBuf};

/// The three string fields a path is split into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub location: String,
    pub name: String,
    pub ext: String,
}

#[inline]
pub fn resource_path(location: &str, name: &str, ext: &str) -> PathBuf {
    Path::new(location).join(format!("{name}{ext}"))
}

#[inline]
pub fn target_path(location: &str, name: &str, ext: &str, hash: &DataHash) -> PathBuf {
    Path::new(location).join(format!("{name}-{hash}{ext}"))
}

/// Split a path into directory, file stem and extension.
///
/// The extension keeps its leading dot. Leading dots of the file name are
/// part of the stem, so `.profile` has no extension. Trailing separators on
/// the directory are dropped unless the directory is the root.
pub fn split_path(path: &str) -> PathParts {
    let (location, file_name) = match path.rfind('/') {
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            let location = if trimmed.is_empty() { head } else { trimmed };
            (location, &path[idx + 1..])
        }
        None => ("", path),
    };

    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    let (name, ext) = match file_name[stem_start..].rfind('.') {
        Some(dot) => file_name.split_at(stem_start + dot),
        None => (file_name, ""),
    };

    PathParts {
        location: location.to_owned(),
        name: name.to_owned(),
        ext: ext.to_owned(),
    }
}
