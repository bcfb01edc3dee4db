use crate::algorithm::DigestAlgorithm;
use crate::HashError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasherConfig {
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
}

impl HasherConfig {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Load config from `~/.config/cachet/hasher.json`.
    pub fn load_default() -> Result<Self, HashError> {
        Self::load(&default_config_path()?)
    }

    /// Like [`load_default`](Self::load_default), but a missing file yields
    /// the defaults.
    pub fn load_default_or_builtin() -> Result<Self, HashError> {
        let path = default_config_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self, HashError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| HashError::Config(format!("invalid hasher config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), HashError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| HashError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, HashError> {
    let home = std::env::var("HOME").map_err(|_| HashError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/cachet/hasher.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/hasher.json");

        HasherConfig::new(DigestAlgorithm::Sha256).save(&path).unwrap();
        let loaded = HasherConfig::load(&path).unwrap();
        assert_eq!(loaded.algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn missing_algorithm_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hasher.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(HasherConfig::load(&path).unwrap(), HasherConfig::default());
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hasher.json");
        std::fs::write(&path, r#"{"algorithm": "md5"}"#).unwrap();
        assert!(matches!(HasherConfig::load(&path), Err(HashError::Config(_))));
    }
}
