use crate::app::models::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "combotext.toml";

/// Picks the configuration file: CLI flag > working directory > user config dir.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }

    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("combotext").join(CONFIG_FILE_NAME))
}

/// Loads the settings at `path`, anchoring relative paths at its directory.
///
/// A missing file is not an error: the result simply has no combos.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        log::warn!("💡 Tip: no configuration found at {}", path.display());
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let settings = parse_settings(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(settings.resolve_relative_to(&base))
}

pub fn parse_settings(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}
