use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Written to disk when no config file exists yet.
pub const DEFAULT_CONFIG_TEMPLATE: &str = "\
# How often a backup is made
backup_hours=24
# Archives older than this are deleted from target_folder
keep_old_hours=168
# Folder to back up
source_folder=
# Folder the archives are written to (created if missing)
target_folder=
# Optional second folder that always holds a copy of the newest archive
secondary_target=
# fast, balanced or maximum
compression_level=maximum
";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingKey(&'static str),
    #[error("failed to parse integer for {key}: {value:?}")]
    InvalidInteger { key: &'static str, value: String },
    #[error("{0} must be a positive integer")]
    NotPositive(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("unknown compression level {0:?}, expected fast, balanced or maximum")]
    UnknownCompression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    Fast,
    Balanced,
    #[default]
    Maximum,
}

impl CompressionLevel {
    /// Deflate level handed to the codec.
    pub fn deflate_level(self) -> i64 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 6,
            CompressionLevel::Maximum => 9,
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(CompressionLevel::Fast),
            "balanced" => Ok(CompressionLevel::Balanced),
            "maximum" | "max" => Ok(CompressionLevel::Maximum),
            _ => Err(ConfigError::UnknownCompression(s.to_string())),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::Fast => "fast",
            CompressionLevel::Balanced => "balanced",
            CompressionLevel::Maximum => "maximum",
        };
        write!(f, "{}", name)
    }
}

/// Settings as read from disk, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub backup_hours: Option<i64>,
    pub keep_old_hours: Option<i64>,
    pub source_folder: Option<String>,
    pub target_folder: Option<String>,
    pub secondary_target: Option<String>,
    pub compression_level: Option<String>,
}

impl RawConfig {
    /// Parse `key=value` lines. `#` and `!` start comments.
    pub fn from_properties(content: &str) -> Result<Self, ConfigError> {
        let mut values: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim(), value.trim());
            }
        }

        Ok(Self {
            backup_hours: parse_int(&values, "backup_hours")?,
            keep_old_hours: parse_int(&values, "keep_old_hours")?,
            source_folder: values.get("source_folder").map(|s| s.to_string()),
            target_folder: values.get("target_folder").map(|s| s.to_string()),
            secondary_target: values.get("secondary_target").map(|s| s.to_string()),
            compression_level: values.get("compression_level").map(|s| s.to_string()),
        })
    }

    pub fn validate(self) -> Result<BackupConfig, ConfigError> {
        let interval_hours = positive(self.backup_hours, "backup_hours")?;
        let retention_hours = positive(self.keep_old_hours, "keep_old_hours")?;
        let source_dir = non_empty(self.source_folder, "source_folder")?;
        let target_dir = non_empty(self.target_folder, "target_folder")?;

        // Blank means the mirror is switched off.
        let secondary_dir = self
            .secondary_target
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let compression = match self.compression_level.as_deref().map(str::trim) {
            None | Some("") => CompressionLevel::default(),
            Some(level) => level.parse()?,
        };

        Ok(BackupConfig {
            interval_hours,
            retention_hours,
            source_dir,
            target_dir,
            secondary_dir,
            compression,
        })
    }
}

fn parse_int(values: &HashMap<&str, &str>, key: &'static str) -> Result<Option<i64>, ConfigError> {
    match values.get(key) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::InvalidInteger {
            key,
            value: raw.to_string(),
        }),
    }
}

fn positive(value: Option<i64>, key: &'static str) -> Result<u64, ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(key))?;
    if value < 1 {
        return Err(ConfigError::NotPositive(key));
    }
    Ok(value as u64)
}

fn non_empty(value: Option<String>, key: &'static str) -> Result<PathBuf, ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(key))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(PathBuf::from(value.trim()))
}

/// Validated configuration. Built once at startup and handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub interval_hours: u64,
    pub retention_hours: u64,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub secondary_dir: Option<PathBuf>,
    pub compression: CompressionLevel,
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }
}

impl fmt::Display for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "every {}h, keep {}h, {} -> {}",
            self.interval_hours,
            self.retention_hours,
            self.source_dir.display(),
            self.target_dir.display()
        )?;
        if let Some(ref secondary) = self.secondary_dir {
            write!(f, ", mirror to {}", secondary.display())?;
        }
        write!(f, ", compression {}", self.compression)
    }
}
