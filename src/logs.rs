use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SchedulerError;

pub const DEFAULT_TAIL_LINES: usize = 20;

/// Fixed stdout/stderr files for a job; they outlive the job itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl LogPaths {
    pub fn new(logs_dir: &Path, name: &str) -> Self {
        Self {
            stdout: logs_dir.join(format!("{name}.log")),
            stderr: logs_dir.join(format!("{name}.err")),
        }
    }

    /// Read the last `lines` lines of each stream that has a file on disk.
    pub fn tail(&self, lines: usize) -> Result<LogTail, SchedulerError> {
        Ok(LogTail {
            stdout: read_tail(&self.stdout, lines)?,
            stderr: read_tail(&self.stderr, lines)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Vec<String>>,
}

impl LogTail {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

/// `None` when the file does not exist; job output may not be UTF-8.
fn read_tail(path: &Path, lines: usize) -> Result<Option<Vec<String>>, SchedulerError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SchedulerError::io(path, e)),
    };
    let content = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = content.trim().lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(Some(all[start..].iter().map(|l| l.to_string()).collect()))
}
