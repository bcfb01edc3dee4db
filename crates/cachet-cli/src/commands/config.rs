use super::{json_pretty, load_config, EXIT_SUCCESS};
use cachet_hash::config::default_config_path;
use cachet_hash::{DigestAlgorithm, HasherConfig};
use std::path::{Path, PathBuf};

pub fn run(
    path: Option<&Path>,
    set_algorithm: Option<DigestAlgorithm>,
    json: bool,
) -> Result<u8, String> {
    let target: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().map_err(|e| e.to_string())?,
    };

    let mut config = if target.exists() {
        load_config(Some(&target))?
    } else {
        HasherConfig::default()
    };

    if let Some(algorithm) = set_algorithm {
        config.algorithm = algorithm;
        config.save(&target).map_err(|e| e.to_string())?;
        tracing::debug!("saved hasher config to {}", target.display());
    }

    if json {
        println!("{}", json_pretty(&config)?);
    } else {
        println!("config:    {}", target.display());
        println!("algorithm: {}", config.algorithm);
    }
    Ok(EXIT_SUCCESS)
}
