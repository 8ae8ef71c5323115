use common::is_archive_name;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Deletes archives in `directory` older than `max_age_hours`.
pub fn prune(directory: &Path, max_age_hours: u64) -> io::Result<usize> {
    prune_at(directory, max_age_hours, SystemTime::now())
}

/// Only immediate files ending in the archive extension are considered.
/// Age is whole hours since last modification and must strictly exceed the
/// limit. A file that cannot be deleted is logged and skipped.
pub fn prune_at(directory: &Path, max_age_hours: u64, now: SystemTime) -> io::Result<usize> {
    prune_with(directory, max_age_hours, now, |path| fs::remove_file(path))
}

fn prune_with<F>(directory: &Path, max_age_hours: u64, now: SystemTime, remove: F) -> io::Result<usize>
where
    F: Fn(&Path) -> io::Result<()>,
{
    log::info!("Deleting old backups in {:?}...", directory);
    let mut count = 0;

    for entry in fs::read_dir(directory)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Failed to read entry in {:?}: {}", directory, e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_archive_name(&name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("Failed to stat {}: {}", name, e);
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("No modification time for {}: {}", name, e);
                continue;
            }
        };
        // Timestamps in the future count as age zero.
        let age_hours = now
            .duration_since(modified)
            .map(|d| d.as_secs() / 3600)
            .unwrap_or(0);

        if age_hours > max_age_hours {
            match remove(&entry.path()) {
                Ok(()) => {
                    log::info!("Deleted {}", name);
                    count += 1;
                }
                Err(e) => log::warn!("Failed to delete {}: {}", name, e),
            }
        }
    }

    log::info!("Done! {} deleted", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOUR: u64 = 3600;

    fn seed(dir: &Path, name: &str, age_secs: u64, now: SystemTime) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(now - Duration::from_secs(age_secs)).unwrap();
        path
    }

    #[test]
    fn test_deletes_only_strictly_older() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let fresh = seed(tmp.path(), "fresh.zip", 10, now);
        // 1h59m is still "1 hour" in whole hours
        let boundary = seed(tmp.path(), "boundary.zip", 2 * HOUR - 60, now);
        let old = seed(tmp.path(), "old.zip", 2 * HOUR, now);
        let ancient = seed(tmp.path(), "ancient.ZIP", 100 * HOUR, now);

        let deleted = prune_at(tmp.path(), 1, now).unwrap();
        assert_eq!(deleted, 2);
        assert!(fresh.exists());
        assert!(boundary.exists());
        assert!(!old.exists());
        assert!(!ancient.exists());
    }

    #[test]
    fn test_ignores_other_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let text = seed(tmp.path(), "notes.txt", 50 * HOUR, now);
        let part = seed(tmp.path(), "data.zip.part", 50 * HOUR, now);
        let dir = tmp.path().join("folder.zip");
        fs::create_dir(&dir).unwrap();
        seed(&dir, "inner.zip", 50 * HOUR, now);

        assert_eq!(prune_at(tmp.path(), 1, now).unwrap(), 0);
        assert!(text.exists());
        assert!(part.exists());
        assert!(dir.join("inner.zip").exists());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        seed(tmp.path(), "a.zip", 5 * HOUR, now);
        seed(tmp.path(), "b.zip", 6 * HOUR, now);
        seed(tmp.path(), "c.zip", 0, now);

        assert_eq!(prune_at(tmp.path(), 2, now).unwrap(), 2);
        assert_eq!(prune_at(tmp.path(), 2, now).unwrap(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(prune(&tmp.path().join("missing"), 1).is_err());
    }

    #[test]
    fn test_undeletable_archive_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let a = seed(tmp.path(), "a.zip", 5 * HOUR, now);
        let b = seed(tmp.path(), "b.zip", 5 * HOUR, now);
        let c = seed(tmp.path(), "c.zip", 5 * HOUR, now);

        let deleted = prune_with(tmp.path(), 1, now, |path| {
            if path.ends_with("b.zip") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "immutable"))
            } else {
                fs::remove_file(path)
            }
        })
        .unwrap();

        assert_eq!(deleted, 2);
        assert!(!a.exists());
        assert!(b.exists());
        assert!(!c.exists());
    }
}
