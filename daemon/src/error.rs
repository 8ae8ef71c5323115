use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read source {path:?}: {source}")]
    Source { path: PathBuf, source: io::Error },
    #[error("failed to write archive {path:?}: {source}")]
    Destination { path: PathBuf, source: io::Error },
    #[error("zip error: {0}")]
    Codec(#[from] zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to prepare secondary folder {path:?}: {source}")]
    Prepare { path: PathBuf, source: io::Error },
    #[error("failed to copy {from:?} to {to:?}: {source}")]
    Copy { from: PathBuf, to: PathBuf, source: io::Error },
    #[error("old secondary backup {path:?} could not be deleted: {source}")]
    Stale { path: PathBuf, source: io::Error },
    #[error("archive to mirror has no file name: {0:?}")]
    NoFileName(PathBuf),
}

/// Errors that abort a cycle before or while the archive is produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("source_folder {0:?} is not a directory")]
    SourceNotDirectory(PathBuf),
    #[error("failed to create target_folder {path:?}: {message}")]
    TargetDir { path: PathBuf, message: String },
    #[error("archive failed: {0}")]
    Archive(String),
    #[error("cycle aborted unexpectedly: {0}")]
    Internal(String),
}

impl From<ArchiveError> for CycleError {
    fn from(err: ArchiveError) -> Self {
        CycleError::Archive(err.to_string())
    }
}
