use chrono::{DateTime, Local};
use std::path::PathBuf;

pub const ARCHIVE_EXTENSION: &str = "zip";

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

/// One produced backup. Not tracked in memory between cycles; the target
/// folder listing is what counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

impl ArchiveFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `<source>-<dd-MM-yyyy-HH-mm-ss>`, without extension.
pub fn archive_stem(source_name: &str, at: DateTime<Local>) -> String {
    format!("{}-{}", source_name, at.format(TIMESTAMP_FORMAT))
}

/// Sequence 0 is the plain name; later ones disambiguate archives made within the same second.
pub fn archive_file_name(stem: &str, sequence: u32) -> String {
    if sequence == 0 {
        format!("{}.{}", stem, ARCHIVE_EXTENSION)
    } else {
        format!("{}-{}.{}", stem, sequence, ARCHIVE_EXTENSION)
    }
}

pub fn is_archive_name(name: &str) -> bool {
    name.to_lowercase().ends_with(&format!(".{}", ARCHIVE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_stem_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(archive_stem("data", at), "data-07-03-2024-09-05-01");
    }

    #[test]
    fn test_archive_file_name_sequence() {
        assert_eq!(archive_file_name("data-x", 0), "data-x.zip");
        assert_eq!(archive_file_name("data-x", 2), "data-x-2.zip");
    }

    #[test]
    fn test_is_archive_name() {
        assert!(is_archive_name("data-01-01-2024-00-00-00.zip"));
        assert!(is_archive_name("OLD.ZIP"));
        assert!(!is_archive_name("data.zip.part"));
        assert!(!is_archive_name("notes.txt"));
    }
}
