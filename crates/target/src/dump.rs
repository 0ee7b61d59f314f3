//! On-disk spill for records a sender could not deliver.
//!
//! Two files per target: `<base>` holds retryable records written on
//! graceful shutdown or unreachable-target failure, `<base>-errors` holds
//! records the downstream rejected as malformed. Both are append-only
//! text, created with owner-only permissions, and safe to replay into the
//! same target later. Spill is the cold path, so one process-wide mutex
//! serializes all writers.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

static DUMP_LOCK: Mutex<()> = Mutex::new(());

/// The quarantine file belonging to a dump-file base.
pub fn errors_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push("-errors");
    PathBuf::from(name)
}

/// Append `lines` to `path`, preceded by an optional one-line marker.
/// The file is created with mode 0600 if missing. Lines are written as
/// given, with a newline supplied for any line missing one.
pub fn append_lines(path: &Path, marker: Option<&str>, lines: &[String]) -> std::io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let _guard = DUMP_LOCK.lock();

    let mut options = std::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    if let Some(marker) = marker {
        writeln!(file, "# {marker}")?;
    }
    for line in lines {
        file.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            file.write_all(b"\n")?;
        }
    }
    file.flush()
}

/// Best-effort append; failures are logged, never propagated.
pub fn append_or_warn(path: &Path, marker: Option<&str>, lines: &[String]) {
    if let Err(error) = append_lines(path, marker, lines) {
        warn!(file = %path.display(), error = %error, "could not write dump file");
    }
}
