//! Cross-process mutual exclusion for read-modify-write cycles.
//!
//! ## Lock File Format
//! Path: `<path>.lock` (e.g. `STATE.md.lock`)
//! Contents: the holder's decimal pid. Existence is the signal, the pid is
//! diagnostics only.
//!
//! ## Acquisition
//! - Exclusive create (`O_CREAT | O_EXCL`); the creator owns the lock and
//!   additionally takes an advisory OS lock on the handle
//! - On contention, a lock whose mtime is older than `stale_after` is
//!   treated as abandoned: removed, then acquisition is retried at once
//! - Otherwise wait `retry_delay * attempt` and retry, up to `retries`
//!   attempts, then give up with [`LockError::Contended`]
//!
//! Release happens on drop and only removes the lock file if it is still the
//! one this handle created.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::atomic::{AtomicWriteError, remove_quietly, with_suffix, write_atomic};

/// Retry and staleness knobs for [`FileLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Maximum acquisition attempts (at least one is always made).
    pub retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * n` afterwards.
    pub retry_delay: Duration,
    /// Lock files older than this are reclaimed.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(100),
            stale_after: Duration::from_millis(5000),
        }
    }
}

impl From<&crate::config::LockConfig> for LockOptions {
    fn from(config: &crate::config::LockConfig) -> Self {
        Self {
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            stale_after: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Errors from lock acquisition and locked updates.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Every attempt found a live lock held by someone else.
    #[error("could not acquire lock {path} after {attempts} attempts")]
    Contended { path: PathBuf, attempts: u32 },

    /// Unexpected I/O while creating the lock file.
    #[error("Lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The guarded document exists but could not be read.
    #[error("Failed to read {path} under lock: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

/// `<path>.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    with_suffix(path, ".lock")
}

/// A held lock on a document. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    /// Kept open for the advisory OS lock; `None` once released.
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `target`.
    pub fn acquire(target: &Path, options: &LockOptions) -> Result<Self, LockError> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let max_attempts = options.retries.max(1);
        // Reclaims retry immediately; bound them too so a filesystem that
        // keeps reporting the same stale file cannot spin forever.
        let mut reclaims_left = max_attempts;
        let mut attempt = 1;

        loop {
            if let Some(file) = try_create(&lock_path)? {
                return Self::finish_acquire(file, lock_path);
            }

            if reclaims_left > 0 && reclaim_if_stale(&lock_path, options.stale_after) {
                reclaims_left -= 1;
                continue;
            }

            if attempt >= max_attempts {
                tracing::debug!(lock = %lock_path.display(), attempts = attempt, "Lock contended");
                return Err(LockError::Contended {
                    path: lock_path,
                    attempts: attempt,
                });
            }

            std::thread::sleep(options.retry_delay * attempt);
            attempt += 1;
        }
    }

    fn finish_acquire(mut file: File, path: PathBuf) -> Result<Self, LockError> {
        if let Err(source) = file.try_lock_exclusive() {
            drop(file);
            remove_quietly(&path);
            return Err(LockError::Io { path, source });
        }
        let pid = std::process::id().to_string();
        if let Err(source) = file.write_all(pid.as_bytes()) {
            // The lock is still ours; the payload is diagnostics only.
            tracing::warn!(lock = %path.display(), error = %source, "Could not write lock payload");
        }
        tracing::debug!(lock = %path.display(), "Lock acquired");
        Ok(FileLock {
            file: Some(file),
            path,
        })
    }

    /// Path of the lock file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let ours = still_ours(&file, &self.path);
        let _ = FileExt::unlock(&file);
        drop(file);
        if ours {
            remove_quietly(&self.path);
            tracing::debug!(lock = %self.path.display(), "Lock released");
        } else {
            tracing::warn!(
                lock = %self.path.display(),
                "Lock was reclaimed by another process before release; leaving it in place"
            );
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn try_create(lock_path: &Path) -> Result<Option<File>, LockError> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        // The lock vanished between create and stat on some platforms.
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && !lock_path.exists() => {
            Ok(None)
        }
        Err(source) => Err(LockError::Io {
            path: lock_path.to_path_buf(),
            source,
        }),
    }
}

/// Remove the lock at `lock_path` if its mtime is older than `stale_after`.
///
/// Returns true when the caller should retry immediately: either the stale
/// lock was removed, or it disappeared on its own in the meantime.
fn reclaim_if_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let age = match lock_age(lock_path) {
        Some(age) => age,
        None => return !lock_path.exists(),
    };
    if age <= stale_after {
        return false;
    }

    // Re-check right before removal to narrow the window against a holder
    // that just re-created the lock.
    if lock_age(lock_path).is_none_or(|age| age <= stale_after) {
        return !lock_path.exists();
    }

    match std::fs::remove_file(lock_path) {
        Ok(()) => {
            tracing::warn!(
                lock = %lock_path.display(),
                age_ms = age.as_millis() as u64,
                "Reclaimed stale lock"
            );
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(lock = %lock_path.display(), error = %e, "Failed to remove stale lock");
            false
        }
    }
}

fn lock_age(lock_path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(lock_path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(unix)]
fn still_ours(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(on_disk)) => held.dev() == on_disk.dev() && held.ino() == on_disk.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_ours(_file: &File, path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|pid| pid.trim() == std::process::id().to_string())
        .unwrap_or(false)
}

/// Run a read → transform → atomic write cycle under `<path>.lock`.
///
/// `update` receives the current content (empty when the file does not
/// exist yet) and returns the new content; it must not do I/O. When the
/// transform returns the content unchanged nothing is written, so mtimes
/// only move on real changes. The lock is released on every path.
pub fn locked_update<F>(path: &Path, options: &LockOptions, update: F) -> Result<String, LockError>
where
    F: FnOnce(&str) -> String,
{
    let _lock = FileLock::acquire(path, options)?;

    let current = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(LockError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let next = update(&current);
    if next != current {
        write_atomic(path, &next)?;
    }
    Ok(next)
}
