pub mod archive;
pub mod command;
pub mod config;

pub use archive::{archive_file_name, archive_stem, is_archive_name, ArchiveFile, ARCHIVE_EXTENSION};
pub use command::Command;
pub use config::{BackupConfig, CompressionLevel, ConfigError, RawConfig, DEFAULT_CONFIG_TEMPLATE};

use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.txt";

/// Optional log file, in addition to stdout.
pub const LOG_FILE_ENV: &str = "BACKUPS_LOG";
pub const LOG_LEVEL_ENV: &str = "BACKUPS_LOG_LEVEL";

/// How long `stop` waits for an in-flight cycle before the process exits anyway.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
