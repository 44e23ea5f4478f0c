//! Error types for registry and daemon operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a scheduler operation before (or instead of) mutating state.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `add` with a name that is already registered.
    #[error("Job '{0}' already exists. Remove it first or use a different name.")]
    DuplicateName(String),

    /// Operation targeted a name absent from the registry.
    #[error("Job '{0}' not found.")]
    NotFound(String),

    /// Name cannot be turned into a label / file name.
    #[error("Invalid job name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Schedule description has the wrong shape.
    #[error("Malformed schedule: {0}")]
    MalformedSchedule(String),

    /// Registry says the job exists but its definition file is gone.
    #[error("Definition file for '{name}' is missing: {path}")]
    DefinitionMissing { name: String, path: PathBuf },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry file {path} is corrupt: {source}")]
    RegistryCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to lock registry at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SchedulerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable tag for the JSON error object.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "duplicate_name",
            Self::NotFound(_) => "not_found",
            Self::InvalidName { .. } => "invalid_name",
            Self::MalformedSchedule(_) => "malformed_schedule",
            Self::DefinitionMissing { .. } => "definition_missing",
            Self::Io { .. } => "io",
            Self::RegistryCorrupt { .. } => "registry_corrupt",
            Self::Lock { .. } => "lock",
        }
    }
}

/// A launchctl invocation that did not succeed.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to execute launchctl: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("launchctl {action} exited with {status}: {stderr}")]
    Refused {
        action: &'static str,
        status: String,
        stderr: String,
    },
}
