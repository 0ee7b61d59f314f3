//! Directory-age helpers shared by the spool scanner and the textfile
//! collector.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How often the collectors look at their directories.
pub const DIRECTORY_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// How long a file must sit untouched before it is picked up, so the
/// writer has finished with it.
pub const MIN_FILE_AGE: Duration = Duration::from_secs(10);

/// Result of one directory scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// All regular files currently present.
    pub total: usize,
    /// Those older than the minimum age, sorted by path.
    pub ready: Vec<PathBuf>,
}

/// List a directory once, counting everything and collecting the entries
/// old enough to consume. Unreadable entries are skipped.
pub fn scan_directory(folder: &Path, min_age: Duration) -> std::io::Result<ScanResult> {
    let mut result = ScanResult::default();
    for entry in std::fs::read_dir(folder)?.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        result.total += 1;
        if is_older_than(&metadata, min_age) {
            result.ready.push(entry.path());
        }
    }
    result.ready.sort();
    Ok(result)
}

/// Paths of regular files in `folder` older than `min_age`, sorted.
pub fn files_older_than(folder: &Path, min_age: Duration) -> std::io::Result<Vec<PathBuf>> {
    Ok(scan_directory(folder, min_age)?.ready)
}

fn is_older_than(metadata: &std::fs::Metadata, min_age: Duration) -> bool {
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|elapsed| elapsed >= min_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_files_are_counted_but_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("b.txt"), "y").unwrap();

        let scan = scan_directory(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(scan.total, 2);
        assert!(scan.ready.is_empty());

        let scan = scan_directory(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(scan.total, 2);
        assert_eq!(scan.ready.len(), 2);
    }

    #[test]
    fn subdirectories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let scan = scan_directory(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(scan.total, 1);
        assert_eq!(scan.ready.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("missing");
        assert!(scan_directory(&gone, Duration::ZERO).is_err());
    }
}
