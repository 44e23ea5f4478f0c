//! Exclusive advisory lock around registry read-modify-write cycles.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::SchedulerError;

/// Holds `flock(LOCK_EX)` on the lock file until dropped.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Block until the lock is acquired. Creates the file (and parents) if needed.
    pub fn acquire(path: &Path) -> Result<Self, SchedulerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SchedulerError::io(path, e))?;

        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc != 0 {
            return Err(SchedulerError::Lock {
                path: path.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        tracing::debug!("Acquired registry lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        // SAFETY: `self.file` is still open here.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            tracing::warn!(
                "Failed to release registry lock {}: {}",
                self.path.display(),
                std::io::Error::last_os_error()
            );
        }
    }
}
