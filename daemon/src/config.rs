use anyhow::{Context, Result};
use common::{BackupConfig, RawConfig, DEFAULT_CONFIG_TEMPLATE};
use std::fs;
use std::path::Path;

/// Load from a YAML file
pub fn from_yaml_file(path: &Path) -> Result<RawConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: RawConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Load from a TOML file
pub fn from_toml_file(path: &Path) -> Result<RawConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: RawConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Load `key=value` lines
pub fn from_properties_file(path: &Path) -> Result<RawConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = RawConfig::from_properties(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Detect file type by extension and load. Anything that is not YAML or TOML
/// is read as properties.
pub fn from_file(path: &Path) -> Result<RawConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        "yaml" | "yml" => from_yaml_file(path),
        "toml" => from_toml_file(path),
        _ => from_properties_file(path),
    }
}

/// Write the commented default config if nothing exists at `path` yet.
/// Returns true when a file was created.
pub fn ensure_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    log::info!("No {} found, creating an empty config...", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config folder: {:?}", parent))?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write default config: {:?}", path))?;
    Ok(true)
}

/// Bootstrap, read and validate.
pub fn load(path: &Path) -> Result<BackupConfig> {
    ensure_exists(path)?;
    let raw = from_file(path)?;
    let config = raw
        .validate()
        .with_context(|| format!("Invalid config in {:?}", path))?;
    Ok(config)
}
