//! cachet-envelope: tagged JSON for pipeline arguments and the resources in
//! them.
//!
//! [`encode`] walks a [`Value`] depth first. Resources are serialized through
//! their [`Handle`](cachet_resource::Handle), which persists targets. [`decode`]
//! reverses it using a [`Registry`] of known type tags; unknown tags decode as
//! plain maps. Cycles cannot be expressed.

pub mod registry;
pub mod value;
pub mod wire;

pub use registry::Registry;
pub use value::Value;
pub use wire::{
    canonical_bytes, decode, encode, from_str, to_string, to_string_pretty, BYTES_TAG, DATA_KEY,
    DATETIME_TAG, DATE_TAG, TYPE_TAG_KEY,
};

use cachet_resource::ResourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("cannot encode non-finite float {0}")]
    NonFiniteFloat(f64),
    #[error("malformed '{tag}' envelope: {reason}")]
    MalformedEnvelope { tag: String, reason: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
