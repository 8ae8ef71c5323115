use crate::error::MirrorError;
use common::is_archive_name;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Replaces whatever archive `secondary_dir` holds with a copy of `newest`.
///
/// The copy is written next to the destination as `<name>.part` first, so a
/// failed copy keeps the previous mirror intact. Old archives are removed only
/// after the copy succeeded, then the part file is renamed into place. An old
/// archive that cannot be removed fails the call with `MirrorError::Stale`,
/// though the new copy is still put in place.
pub fn sync(newest: &Path, secondary_dir: &Path) -> Result<PathBuf, MirrorError> {
    sync_with(newest, secondary_dir, |path| fs::remove_file(path))
}

fn sync_with<F>(newest: &Path, secondary_dir: &Path, remove: F) -> Result<PathBuf, MirrorError>
where
    F: Fn(&Path) -> io::Result<()>,
{
    log::info!("Updating secondary backup in {:?}...", secondary_dir);
    let prepare = |source| MirrorError::Prepare {
        path: secondary_dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(secondary_dir).map_err(prepare)?;

    let name = newest
        .file_name()
        .ok_or_else(|| MirrorError::NoFileName(newest.to_path_buf()))?;
    let dest = secondary_dir.join(name);
    let mut part_name = name.to_os_string();
    part_name.push(".part");
    let part = secondary_dir.join(part_name);

    log::info!("Copying backup...");
    if let Err(source) = fs::copy(newest, &part) {
        let _ = fs::remove_file(&part);
        return Err(MirrorError::Copy {
            from: newest.to_path_buf(),
            to: dest,
            source,
        });
    }

    let mut stale: Option<(PathBuf, io::Error)> = None;
    for entry in fs::read_dir(secondary_dir).map_err(prepare)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Failed to read entry in {:?}: {}", secondary_dir, e);
                continue;
            }
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file || !is_archive_name(&file_name) {
            continue;
        }
        let path = entry.path();
        match remove(&path) {
            Ok(()) => log::info!("Deleted old secondary backup: {}", file_name),
            Err(e) => {
                log::warn!("Failed to delete old secondary backup {}: {}", file_name, e);
                // the rename below replaces an undeletable file of the same name
                if path != dest && stale.is_none() {
                    stale = Some((path, e));
                }
            }
        }
    }

    if let Err(source) = fs::rename(&part, &dest) {
        let _ = fs::remove_file(&part);
        return Err(MirrorError::Copy {
            from: newest.to_path_buf(),
            to: dest,
            source,
        });
    }

    if let Some((path, source)) = stale {
        return Err(MirrorError::Stale { path, source });
    }

    log::info!("Done!");
    Ok(dest)
}
