//! All-or-nothing single-file replace.
//!
//! Uses the temp-file + fsync + rename pattern:
//! 1. Write the new content to a temporary sibling and fsync it
//! 2. Copy the current file to `<path>.bak` (best effort)
//! 3. Rename the temporary file onto `<path>` (atomic on POSIX and NTFS)
//! 4. Remove `<path>.bak` once the rename succeeded
//!
//! A reader opening `<path>` at any moment sees the complete old content or
//! the complete new content. Temp names carry the pid and a per-process
//! sequence number so two writers racing on the same path never share a
//! temp file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Errors from atomic replace.
#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    /// Could not create, write or fsync the temporary file.
    #[error("Failed to write temp file {path}: {source}")]
    TempWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rename onto the target failed; the target keeps its old content.
    #[error("Failed to replace {path}: {source}")]
    Replace {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `<path>.bak`
pub fn backup_path_for(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

fn temp_path_for(path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    with_suffix(path, &format!(".{}.{seq}.tmp", std::process::id()))
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Replace `path` with `content` atomically.
///
/// Parent directories are created when missing. Backup copy and cleanup
/// failures are logged and never change the result.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), AtomicWriteError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| AtomicWriteError::TempWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = temp_path_for(path);
    if let Err(source) = write_and_sync(&temp_path, content) {
        remove_quietly(&temp_path);
        return Err(AtomicWriteError::TempWrite {
            path: temp_path,
            source,
        });
    }

    let backup = backup_path_for(path);
    let backed_up = if path.exists() {
        match std::fs::copy(path, &backup) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Backup copy failed, continuing");
                false
            }
        }
    } else {
        false
    };

    if let Err(source) = std::fs::rename(&temp_path, path) {
        // rename never leaves a half-written target; only restore if the
        // target vanished underneath us.
        if backed_up
            && !path.exists()
            && let Err(e) = std::fs::copy(&backup, path)
        {
            tracing::warn!(path = %path.display(), error = %e, "Restore from backup failed");
        }
        remove_quietly(&temp_path);
        return Err(AtomicWriteError::Replace {
            path: path.to_path_buf(),
            source,
        });
    }

    if backed_up {
        remove_quietly(&backup);
    }

    tracing::debug!(path = %path.display(), bytes = content.len(), "Atomic write complete");
    Ok(())
}

fn write_and_sync(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

/// Best-effort removal; a missing file is not worth a log line.
pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cleanup failed"),
    }
}
