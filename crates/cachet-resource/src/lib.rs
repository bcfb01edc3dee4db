//! Lazily loaded data handles and content-addressed targets for cachet.
//!
//! This crate provides the resource layer: canonical path naming (`naming`),
//! the `Codec`/`ContentHash` contract each data kind implements, `Resource`
//! for location-addressed sources, `Target` for write-once, hash-verified
//! persistence, the type-erased `Handle` used by the envelope serializer, and
//! `verify_handles` for integrity sweeps over decoded handles.

pub mod codec;
pub mod handle;
pub mod integrity;
pub mod metadata;
pub mod naming;
pub mod resource;
pub mod target;
pub mod types;

pub use codec::{check_extension, Codec, ContentHash};
pub use handle::{decode_source, decode_target, source_tag, target_tag, Handle, HandleFactory};
pub use integrity::{verify_handles, IntegrityFailure, IntegrityReport};
pub use metadata::Metadata;
pub use naming::{resource_path, split_path, target_path, PathParts};
pub use resource::Resource;
pub use target::Target;
pub use types::{DataHash, TypeTag};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory so that a preceding rename into it is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource does not exist at {}", .0.display())]
    NotFound(PathBuf),
    #[error(
        "integrity check failed for '{}': expected {expected}, got {actual} \
         (the file is from a different run or corrupted)",
        path.display()
    )]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("invalid extension '{ext}' for {kind} resources, expected one of: {}", expected.join(", "))]
    InvalidExtension {
        kind: &'static str,
        ext: String,
        expected: &'static [&'static str],
    },
    #[error("malformed {kind} file '{}': {reason}", path.display())]
    Format {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("resource I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResourceError {
    pub(crate) fn missing_field(field: &str) -> Self {
        Self::InvalidField {
            field: field.to_owned(),
            reason: "missing".to_owned(),
        }
    }
}
