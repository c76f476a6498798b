//! Manifest loading.
//!
//! The deployment manifest is a TOML file describing one named fleet. It is
//! looked up in order: the `--config` flag, `flotilla.toml` in the current
//! directory, then the user config directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use flotilla_fleet::FleetConfig;

/// Manifest file name.
const MANIFEST_FILE: &str = "flotilla.toml";

/// Load the manifest from the explicit path or the default locations.
pub fn load_manifest(explicit: Option<&PathBuf>) -> Result<FleetConfig> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => default_manifest_path()?,
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest from {:?}", path))?;

    FleetConfig::from_toml(&contents)
        .with_context(|| format!("Failed to parse manifest from {:?}", path))
}

fn default_manifest_path() -> Result<PathBuf> {
    let local = PathBuf::from(MANIFEST_FILE);
    if local.exists() {
        return Ok(local);
    }

    let fallback = ProjectDirs::from("dev", "flotilla", "flotilla")
        .map(|dirs| dirs.config_dir().join(MANIFEST_FILE))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    if fallback.exists() {
        Ok(fallback)
    } else {
        anyhow::bail!(
            "No manifest found: pass --config, or create {} here or in the user config directory",
            MANIFEST_FILE
        )
    }
}
