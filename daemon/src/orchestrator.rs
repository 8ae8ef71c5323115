use crate::archiver::Archiver;
use crate::cycle::{CycleResult, CycleRunner, StepStatus};
use crate::error::CycleError;
use common::BackupConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub result: CycleResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The in-flight cycle, if any, finished in time.
    Drained,
    /// Gave up waiting; a cycle may still be writing.
    TimedOut,
}

/// Owns the schedule and the shutdown flag.
///
/// Timer fires and manual triggers go through one FIFO queue drained by a
/// single worker, so at most one cycle runs at a time and cycles run in the
/// order they were requested.
pub struct Orchestrator {
    queue: mpsc::UnboundedSender<Trigger>,
    shutting_down: Arc<AtomicBool>,
    timer: JoinHandle<()>,
    worker: JoinHandle<()>,
    reports: broadcast::Sender<CycleReport>,
}

impl Orchestrator {
    /// First scheduled cycle fires one interval after start.
    pub fn start(config: BackupConfig, archiver: Arc<dyn Archiver>) -> Self {
        let period = config.interval();
        Self::start_with_period(config, archiver, period)
    }

    pub(crate) fn start_with_period(
        config: BackupConfig,
        archiver: Arc<dyn Archiver>,
        period: Duration,
    ) -> Self {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let runner = Arc::new(CycleRunner::new(config, archiver, shutting_down.clone()));
        let (queue, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(16);

        log::info!("Starting backup task with {:?} delay...", period);

        let timer_queue = queue.clone();
        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if timer_queue.send(Trigger::Scheduled).is_err() {
                    break;
                }
            }
        });

        let worker = tokio::spawn(work(runner, rx, shutting_down.clone(), reports.clone()));

        Self {
            queue,
            shutting_down,
            timer,
            worker,
            reports,
        }
    }

    /// Receives a report for every cycle that finishes after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Queues a cycle behind whatever is running or already queued.
    /// Returns false once shutdown has begun.
    pub fn trigger_manual(&self) -> bool {
        if self.is_shutting_down() {
            log::warn!("Ignoring manual backup, shutting down");
            return false;
        }
        log::info!("Manual backup queued");
        self.queue.send(Trigger::Manual).is_ok()
    }

    /// Stops scheduling, drops queued cycles and waits up to `timeout` for the
    /// running one. Nothing is rolled back if the wait times out.
    pub async fn stop(self, timeout: Duration) -> StopOutcome {
        log::info!("Stopping...");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.timer.abort();
        drop(self.queue);

        match tokio::time::timeout(timeout, self.worker).await {
            Ok(_) => {
                log::info!("Backup worker stopped");
                StopOutcome::Drained
            }
            Err(_) => {
                log::warn!(
                    "Backup still running after {:?}, stopping anyway; the last archive or mirror copy may be incomplete",
                    timeout
                );
                StopOutcome::TimedOut
            }
        }
    }
}

async fn work(
    runner: Arc<CycleRunner>,
    mut rx: mpsc::UnboundedReceiver<Trigger>,
    shutting_down: Arc<AtomicBool>,
    reports: broadcast::Sender<CycleReport>,
) {
    while let Some(trigger) = rx.recv().await {
        if shutting_down.load(Ordering::SeqCst) {
            log::info!("Dropping queued {} backup due to shutdown", trigger);
            continue;
        }

        log::info!("Starting {} backup cycle", trigger);
        let cycle_runner = runner.clone();
        // A panic inside the cycle must not take the worker down with it.
        let result = match tokio::task::spawn_blocking(move || cycle_runner.run_cycle()).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Backup cycle crashed: {}", e);
                CycleResult::failed(CycleError::Internal(e.to_string()))
            }
        };

        log_outcome(trigger, &result);
        let _ = reports.send(CycleReport { trigger, result });

        if shutting_down.load(Ordering::SeqCst) {
            break;
        }
    }
}

fn log_outcome(trigger: Trigger, result: &CycleResult) {
    let archive = result
        .archive
        .as_ref()
        .map(|a| a.file_name())
        .unwrap_or_default();

    if !result.success {
        let error = result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        log::error!("{} backup failed: {}", trigger, error);
    } else if result.is_partial() {
        let mut failed = Vec::new();
        if let StepStatus::Failed(ref e) = result.retention {
            failed.push(format!("retention: {}", e));
        }
        if let StepStatus::Failed(ref e) = result.mirror {
            failed.push(format!("mirror: {}", e));
        }
        log::warn!(
            "{} backup {} created with errors ({}), {} old deleted",
            trigger,
            archive,
            failed.join("; "),
            result.deleted_count
        );
    } else {
        log::info!(
            "{} backup {} complete, {} old deleted, mirror {:?}",
            trigger,
            archive,
            result.deleted_count,
            result.mirror
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::tests::{config, FailingArchiver};
    use crate::error::ArchiveError;
    use common::{ArchiveFile, CompressionLevel};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a placeholder archive after sleeping, recording start/end order.
    struct SlowArchiver {
        delay: Duration,
        calls: AtomicUsize,
        events: Mutex<Vec<String>>,
    }

    impl SlowArchiver {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl Archiver for SlowArchiver {
        fn archive(&self, _: &Path, dest_path: &Path, _: CompressionLevel) -> Result<ArchiveFile, ArchiveError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("start {}", n));
            std::thread::sleep(self.delay);
            std::fs::write(dest_path, b"placeholder").map_err(|source| ArchiveError::Destination {
                path: dest_path.to_path_buf(),
                source,
            })?;
            self.events.lock().unwrap().push(format!("end {}", n));
            Ok(ArchiveFile {
                path: dest_path.to_path_buf(),
                created_at: chrono::Local::now(),
                size_bytes: 11,
            })
        }
    }

    async fn next_report(rx: &mut broadcast::Receiver<CycleReport>) -> CycleReport {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for cycle")
            .unwrap()
    }

    #[tokio::test]
    async fn test_manual_trigger_queues_behind_running_cycle() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(SlowArchiver::new(Duration::from_millis(300)));
        let orchestrator = Orchestrator::start(config(tmp.path(), None), archiver.clone());
        let mut rx = orchestrator.subscribe();

        assert!(orchestrator.trigger_manual());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(orchestrator.trigger_manual());

        let first = next_report(&mut rx).await;
        let second = next_report(&mut rx).await;
        assert_eq!(first.trigger, Trigger::Manual);
        assert!(first.result.success);
        assert!(second.result.success);
        assert_ne!(first.result.archive.unwrap().path, second.result.archive.unwrap().path);

        assert_eq!(archiver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *archiver.events.lock().unwrap(),
            vec!["start 0", "end 0", "start 1", "end 1"]
        );

        assert_eq!(orchestrator.stop(Duration::from_secs(5)).await, StopOutcome::Drained);
    }

    #[tokio::test]
    async fn test_manual_trigger_waits_for_scheduled_cycle() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(SlowArchiver::new(Duration::from_millis(400)));
        let orchestrator = Orchestrator::start_with_period(
            config(tmp.path(), None),
            archiver.clone(),
            Duration::from_millis(150),
        );
        let mut rx = orchestrator.subscribe();

        let deadline = Instant::now() + Duration::from_secs(5);
        while archiver.calls.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "scheduled cycle never started");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(orchestrator.trigger_manual());

        let first = next_report(&mut rx).await;
        let second = next_report(&mut rx).await;
        assert_eq!(first.trigger, Trigger::Scheduled);
        assert_eq!(second.trigger, Trigger::Manual);
        assert!(second.result.success);

        let events = archiver.events.lock().unwrap().clone();
        assert_eq!(events[..4], ["start 0", "end 0", "start 1", "end 1"]);

        orchestrator.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_timer_fires_repeatedly() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(SlowArchiver::new(Duration::ZERO));
        let orchestrator = Orchestrator::start_with_period(
            config(tmp.path(), None),
            archiver.clone(),
            Duration::from_millis(100),
        );
        let mut rx = orchestrator.subscribe();

        assert_eq!(next_report(&mut rx).await.trigger, Trigger::Scheduled);
        assert_eq!(next_report(&mut rx).await.trigger, Trigger::Scheduled);

        orchestrator.stop(Duration::from_secs(5)).await;
        assert!(archiver.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_worker() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(FailingArchiver::default());
        let orchestrator = Orchestrator::start(config(tmp.path(), None), archiver.clone());
        let mut rx = orchestrator.subscribe();

        orchestrator.trigger_manual();
        orchestrator.trigger_manual();
        assert!(!next_report(&mut rx).await.result.success);
        assert!(!next_report(&mut rx).await.result.success);
        assert_eq!(archiver.calls.load(Ordering::SeqCst), 2);

        orchestrator.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_cycle_and_drops_queue() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(SlowArchiver::new(Duration::from_millis(300)));
        let orchestrator = Orchestrator::start(config(tmp.path(), None), archiver.clone());
        let mut rx = orchestrator.subscribe();

        orchestrator.trigger_manual();
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.trigger_manual();

        assert_eq!(orchestrator.stop(Duration::from_secs(5)).await, StopOutcome::Drained);
        assert!(next_report(&mut rx).await.result.success);
        assert_eq!(archiver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_gives_up_after_timeout() {
        let tmp = TempDir::new().unwrap();
        let archiver = Arc::new(SlowArchiver::new(Duration::from_secs(2)));
        let orchestrator = Orchestrator::start(config(tmp.path(), None), archiver.clone());

        orchestrator.trigger_manual();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let timeout = Duration::from_millis(200);
        let started = std::time::Instant::now();
        assert_eq!(orchestrator.stop(timeout).await, StopOutcome::TimedOut);
        assert!(started.elapsed() < timeout + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_idle_stop_is_immediate() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::start(config(tmp.path(), None), Arc::new(FailingArchiver::default()));
        assert!(!orchestrator.is_shutting_down());
        assert_eq!(orchestrator.stop(Duration::from_secs(1)).await, StopOutcome::Drained);
    }
}
