//! cachet-hash: deterministic cache keys for pipeline steps.
//!
//! [`hash_objects`] turns positional and named arguments into a hex digest.
//! Targets inside the arguments contribute their content hash rather than
//! their identity, so the key depends only on data that is actually on disk.

mod algorithm;
mod binary;
pub mod config;
mod objects;

pub use algorithm::DigestAlgorithm;
pub use config::HasherConfig;
pub use objects::{hash_objects, hash_objects_with, task_input_hash, task_input_hash_with};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
