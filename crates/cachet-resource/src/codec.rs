//! The boundary every concrete data kind implements.
//!
//! A codec reads and writes one payload type at a path. Kinds that can back a
//! [`Target`](crate::Target) additionally implement [`ContentHash`], whose
//! digest must depend on payload content only: the same values, shape and
//! element type hash identically in every process, and a change to any of
//! them changes the digest.

use crate::types::DataHash;
use crate::ResourceError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

pub trait Codec: fmt::Debug + Sized {
    type Payload: Clone + fmt::Debug;

    /// Short kind name used in type tags (`cachet.<KIND>.Source`).
    const KIND: &'static str;

    /// Accepted file extensions, leading dot included, compared without
    /// regard to case. Empty accepts any.
    const EXTENSIONS: &'static [&'static str] = &[];

    /// Whether targets of this kind carry free-form metadata and a resolution.
    const CARRIES_METADATA: bool = false;

    fn read(&self, path: &Path) -> Result<Self::Payload, ResourceError>;

    fn write(&self, path: &Path, payload: &Self::Payload) -> Result<(), ResourceError>;

    /// Codec options that belong in the envelope next to `location`, `name`
    /// and `ext`.
    fn fields(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Rebuild codec options from envelope fields.
    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ResourceError>;
}

pub trait ContentHash: Codec {
    fn hash(&self, payload: &Self::Payload) -> DataHash;
}

pub fn check_extension<C: Codec>(ext: &str) -> Result<(), ResourceError> {
    let listed = C::EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext));
    if C::EXTENSIONS.is_empty() || listed {
        return Ok(());
    }
    Err(ResourceError::InvalidExtension {
        kind: C::KIND,
        ext: ext.to_owned(),
        expected: C::EXTENSIONS,
    })
}
