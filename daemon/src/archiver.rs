use crate::error::ArchiveError;
use chrono::{DateTime, Local};
use common::{archive_file_name, archive_stem, ArchiveFile, CompressionLevel};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Turns a folder into a single archive file.
///
/// Implementations write exactly one file at `dest_path` and must not leave
/// anything there when they fail.
pub trait Archiver: Send + Sync {
    fn archive(
        &self,
        source_dir: &Path,
        dest_path: &Path,
        level: CompressionLevel,
    ) -> Result<ArchiveFile, ArchiveError>;
}

/// Deflate zip writer. The archive is built as `<dest>.part` and renamed into
/// place once finished; the part file is removed on failure.
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn archive(
        &self,
        source_dir: &Path,
        dest_path: &Path,
        level: CompressionLevel,
    ) -> Result<ArchiveFile, ArchiveError> {
        let part = part_path(dest_path);

        let result = write_zip(source_dir, &part, level).and_then(|_| {
            fs::rename(&part, dest_path).map_err(|source| ArchiveError::Destination {
                path: dest_path.to_path_buf(),
                source,
            })
        });

        if let Err(e) = result {
            if part.exists() {
                if let Err(rm) = fs::remove_file(&part) {
                    log::warn!("Failed to remove partial archive {:?}: {}", part, rm);
                }
            }
            return Err(e);
        }

        let metadata = fs::metadata(dest_path).map_err(|source| ArchiveError::Destination {
            path: dest_path.to_path_buf(),
            source,
        })?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());

        Ok(ArchiveFile {
            path: dest_path.to_path_buf(),
            created_at,
            size_bytes: metadata.len(),
        })
    }
}

fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn write_zip(source_dir: &Path, out: &Path, level: CompressionLevel) -> Result<(), ArchiveError> {
    let destination = |source: io::Error| ArchiveError::Destination {
        path: out.to_path_buf(),
        source,
    };

    let root_name = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());

    let file = File::create(out).map_err(destination)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level.deflate_level()));

    for entry in WalkDir::new(source_dir).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::Source {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| source_dir.to_path_buf()),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(source_dir).unwrap_or(entry.path());
        let name = entry_name(&root_name, rel);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            let mut input = File::open(entry.path()).map_err(|source| ArchiveError::Source {
                path: entry.path().to_path_buf(),
                source,
            })?;
            zip.start_file(name, options)?;
            io::copy(&mut input, &mut zip).map_err(|source| ArchiveError::Source {
                path: entry.path().to_path_buf(),
                source,
            })?;
        }
        // symlinks are not followed and not stored
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(destination)?;
    Ok(())
}

/// Entries are rooted at the source folder's own name, `/`-separated.
fn entry_name(root_name: &str, rel: &Path) -> String {
    let mut name = root_name.to_string();
    for component in rel.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

/// Picks the destination for a new archive of `source_dir` inside `target_dir`.
/// A sequence suffix is added when an archive with the same second already exists.
pub fn next_archive_path(target_dir: &Path, source_dir: &Path, now: DateTime<Local>) -> PathBuf {
    let source_name = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    let stem = archive_stem(&source_name, now);

    let mut sequence = 0;
    loop {
        let candidate = target_dir.join(archive_file_name(&stem, sequence));
        if !candidate.exists() {
            return candidate;
        }
        sequence += 1;
    }
}
