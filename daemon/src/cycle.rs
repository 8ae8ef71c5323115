use crate::archiver::{next_archive_path, Archiver};
use crate::error::CycleError;
use crate::{mirror, retention};
use chrono::Local;
use common::{ArchiveFile, BackupConfig};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What happened to a step that runs after the archive exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    NotRun,
    Skipped(&'static str),
    Done,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CycleResult {
    /// True once the primary archive was written, even if later steps failed.
    pub success: bool,
    pub archive: Option<ArchiveFile>,
    pub deleted_count: usize,
    pub retention: StepStatus,
    pub mirror: StepStatus,
    pub error: Option<CycleError>,
}

impl CycleResult {
    pub fn failed(error: CycleError) -> Self {
        Self {
            success: false,
            archive: None,
            deleted_count: 0,
            retention: StepStatus::NotRun,
            mirror: StepStatus::NotRun,
            error: Some(error),
        }
    }

    fn archived(archive: ArchiveFile) -> Self {
        Self {
            success: true,
            archive: Some(archive),
            deleted_count: 0,
            retention: StepStatus::NotRun,
            mirror: StepStatus::NotRun,
            error: None,
        }
    }

    /// Archive written but retention or mirror failed.
    pub fn is_partial(&self) -> bool {
        self.success
            && (matches!(self.retention, StepStatus::Failed(_))
                || matches!(self.mirror, StepStatus::Failed(_)))
    }
}

/// Runs one archive -> retain -> mirror sequence. Blocking; the orchestrator
/// calls it from a single worker so cycles never overlap.
pub struct CycleRunner {
    config: BackupConfig,
    archiver: Arc<dyn Archiver>,
    shutting_down: Arc<AtomicBool>,
}

impl CycleRunner {
    pub fn new(config: BackupConfig, archiver: Arc<dyn Archiver>, shutting_down: Arc<AtomicBool>) -> Self {
        Self {
            config,
            archiver,
            shutting_down,
        }
    }

    pub fn run_cycle(&self) -> CycleResult {
        log::info!("Creating backup...");

        let archive = match self.produce_archive() {
            Ok(archive) => archive,
            Err(e) => {
                log::error!("Backup failed! {}", e);
                return CycleResult::failed(e);
            }
        };
        log::info!(
            "Backup finished: {} ({} bytes)",
            archive.path.display(),
            archive.size_bytes
        );

        let mut result = CycleResult::archived(archive.clone());

        match retention::prune(&self.config.target_dir, self.config.retention_hours) {
            Ok(count) => {
                result.deleted_count = count;
                result.retention = StepStatus::Done;
            }
            Err(e) => {
                log::error!(
                    "Deleting old backups in {:?} failed: {}",
                    self.config.target_dir,
                    e
                );
                result.retention = StepStatus::Failed(e.to_string());
            }
        }

        result.mirror = self.mirror(&archive);
        result
    }

    fn produce_archive(&self) -> Result<ArchiveFile, CycleError> {
        let source = &self.config.source_dir;
        if !source.is_dir() {
            return Err(CycleError::SourceNotDirectory(source.clone()));
        }

        let target = &self.config.target_dir;
        fs::create_dir_all(target).map_err(|e| CycleError::TargetDir {
            path: target.clone(),
            message: e.to_string(),
        })?;

        let dest = next_archive_path(target, source, Local::now());
        let archive = self
            .archiver
            .archive(source, &dest, self.config.compression)?;
        Ok(archive)
    }

    fn mirror(&self, archive: &ArchiveFile) -> StepStatus {
        let Some(ref secondary) = self.config.secondary_dir else {
            return StepStatus::Skipped("disabled");
        };
        if self.shutting_down.load(Ordering::SeqCst) {
            log::info!("Skipping secondary backup update due to shutdown");
            return StepStatus::Skipped("shutting down");
        }

        match mirror::sync(&archive.path, secondary) {
            Ok(_) => StepStatus::Done,
            Err(e) => {
                log::error!("Secondary backup failed: {}", e);
                StepStatus::Failed(e.to_string())
            }
        }
    }
}
