pub mod config;
pub mod hash;
pub mod inspect;
pub mod verify;

use cachet_envelope::{from_str, EnvelopeError, Registry, Value};
use cachet_hash::{DigestAlgorithm, HasherConfig};
use cachet_resource::ResourceError;
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INTEGRITY: u8 = 2;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn describe(err: EnvelopeError) -> String {
    match err {
        EnvelopeError::Resource(e @ ResourceError::Integrity { .. }) => {
            format!("integrity error: {e}")
        }
        other => other.to_string(),
    }
}

/// Read and decode an envelope file with the builtin resource kinds.
pub fn load_document(file: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read '{}': {e}", file.display()))?;
    from_str(&text, &Registry::builtin()).map_err(describe)
}

pub fn load_config(path: Option<&Path>) -> Result<HasherConfig, String> {
    match path {
        Some(p) => HasherConfig::load(p).map_err(|e| e.to_string()),
        None => HasherConfig::load_default_or_builtin().map_err(|e| e.to_string()),
    }
}

/// An explicit choice wins over the config file.
pub fn resolve_algorithm(
    explicit: Option<DigestAlgorithm>,
    config: Option<&Path>,
) -> Result<DigestAlgorithm, String> {
    match explicit {
        Some(a) => Ok(a),
        None => Ok(load_config(config)?.algorithm),
    }
}
