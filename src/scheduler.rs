//! Keeps the registry, the plist files and launchd in step.
//!
//! Mutating operations hold the registry lock from load to save. A daemon
//! refusal never aborts a mutation: the registry records intent and the
//! refusal is reported in the result so the caller can retry the daemon step.

use std::path::PathBuf;

use chrono::Local;
use serde::Serialize;

use crate::config::Config;
use crate::daemon::Daemon;
use crate::definition::{DefinitionWriter, JobDefinition};
use crate::error::{DaemonError, SchedulerError};
use crate::lock::RegistryLock;
use crate::logs::{LogPaths, LogTail};
use crate::registry::{self, JobRecord, RegistryStore};
use crate::schedule::Schedule;

/// Outcome of the launchctl call made by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStep {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStep {
    fn from_result(action: &str, name: &str, result: Result<(), DaemonError>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => {
                tracing::warn!("Daemon {action} failed for '{name}': {e}");
                Self {
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobChange {
    pub status: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    pub daemon: DaemonStep,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub name: String,
    /// Registry intent.
    pub enabled: bool,
    /// Live launchd state; `None` when launchd could not be queried.
    pub loaded: Option<bool>,
    pub schedule: String,
    pub command: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobView>,
    pub count: usize,
    pub daemon_reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct LogsReport {
    pub name: String,
    #[serde(flatten)]
    pub tail: LogTail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct Scheduler<D: Daemon> {
    config: Config,
    store: RegistryStore,
    writer: DefinitionWriter,
    daemon: D,
}

impl<D: Daemon> Scheduler<D> {
    pub fn new(config: Config, daemon: D) -> Self {
        let store = RegistryStore::new(config.registry_file());
        tracing::debug!("Registry file {}", store.path().display());
        Self {
            store,
            writer: DefinitionWriter::new(config.launch_agents_dir.clone()),
            config,
            daemon,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock(&self) -> Result<RegistryLock, SchedulerError> {
        RegistryLock::acquire(&self.config.lock_file())
    }

    /// Write the plist, load it, then append the record.
    ///
    /// The record is kept even if launchd refuses the load, since the plist is
    /// picked up again on the next login. If the registry cannot be saved, the
    /// plist is unloaded and deleted so no job runs without a record.
    pub async fn add(
        &self,
        name: &str,
        command: &str,
        schedule: Schedule,
        description: &str,
    ) -> Result<JobChange, SchedulerError> {
        registry::validate_name(name)?;
        let _lock = self.lock()?;
        let mut records = self.store.load()?;
        if RegistryStore::find(&records, name).is_some() {
            return Err(SchedulerError::DuplicateName(name.to_string()));
        }

        let native = schedule.translate();
        let label = registry::label_for(&self.config.label_prefix, name);
        let logs = LogPaths::new(&self.config.logs_dir(), name);
        let path = self.writer.write(&JobDefinition {
            label: &label,
            shell: &self.config.shell,
            command,
            schedule: &native,
            logs: &logs,
        })?;

        let daemon = DaemonStep::from_result("load", name, self.daemon.load(&path).await);

        records.push(JobRecord {
            name: name.to_string(),
            label,
            command: command.to_string(),
            schedule,
            description: description.to_string(),
            definition_path: path.clone(),
            enabled: true,
            created_at: Local::now(),
        });
        if let Err(e) = self.store.save(&records) {
            tracing::warn!("Registry save failed for '{name}', rolling back definition: {e}");
            if daemon.ok
                && let Err(unload) = self.daemon.unload(&path).await
            {
                tracing::warn!("Rollback unload failed for '{name}': {unload}");
            }
            if let Err(delete) = self.writer.delete(&path) {
                tracing::warn!("Rollback delete failed for '{name}': {delete}");
            }
            return Err(e);
        }

        tracing::info!("Added job '{name}' ({})", schedule.summary());
        Ok(JobChange {
            status: "added",
            name: name.to_string(),
            definition: Some(path),
            schedule: Some(schedule),
            daemon,
        })
    }

    /// Lock for an operation on an existing job. With no registry file there is
    /// nothing to mutate, so report the name as missing without touching disk.
    fn lock_existing(&self, name: &str) -> Result<RegistryLock, SchedulerError> {
        if !self.store.path().exists() {
            return Err(SchedulerError::NotFound(name.to_string()));
        }
        self.lock()
    }

    /// Unload, delete the plist and drop the record. Log files are left alone.
    ///
    /// If the plist cannot be deleted or the registry cannot be saved, the
    /// plist is restored and loaded again so launchd matches the registry.
    pub async fn remove(&self, name: &str) -> Result<JobChange, SchedulerError> {
        registry::validate_name(name)?;
        let _lock = self.lock_existing(name)?;
        let mut records = self.store.load()?;
        let record = RegistryStore::find(&records, name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?
            .clone();
        let path = &record.definition_path;

        let (daemon, backup) = if path.exists() {
            let backup = std::fs::read(path).ok();
            let step = DaemonStep::from_result("unload", name, self.daemon.unload(path).await);
            (step, backup)
        } else {
            (
                DaemonStep::skipped("definition file missing; nothing to unload"),
                None,
            )
        };

        let result = match self.writer.delete(path) {
            Ok(()) => {
                records.retain(|r| r.name != name);
                self.store.save(&records)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Remove of '{name}' failed, restoring definition: {e}");
            if let Some(bytes) = backup
                && !path.exists()
                && let Err(restore) = self.writer.restore(path, &bytes)
            {
                tracing::warn!("Rollback restore failed for '{name}': {restore}");
            }
            if daemon.ok
                && let Err(load) = self.daemon.load(path).await
            {
                tracing::warn!("Rollback load failed for '{name}': {load}");
            }
            return Err(e);
        }

        tracing::info!("Removed job '{name}'");
        Ok(JobChange {
            status: "removed",
            name: name.to_string(),
            definition: None,
            schedule: None,
            daemon,
        })
    }

    /// Load an existing plist again. A missing plist is reported, not rebuilt.
    pub async fn enable(&self, name: &str) -> Result<JobChange, SchedulerError> {
        registry::validate_name(name)?;
        let _lock = self.lock_existing(name)?;
        let mut records = self.store.load()?;
        let record = RegistryStore::find_mut(&mut records, name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;

        if !record.definition_path.exists() {
            return Err(SchedulerError::DefinitionMissing {
                name: name.to_string(),
                path: record.definition_path.clone(),
            });
        }
        let daemon =
            DaemonStep::from_result("load", name, self.daemon.load(&record.definition_path).await);
        record.enabled = true;
        let path = record.definition_path.clone();
        if let Err(e) = self.store.save(&records) {
            tracing::warn!("Registry save failed for '{name}', unloading again: {e}");
            if daemon.ok
                && let Err(unload) = self.daemon.unload(&path).await
            {
                tracing::warn!("Rollback unload failed for '{name}': {unload}");
            }
            return Err(e);
        }

        tracing::info!("Enabled job '{name}'");
        Ok(JobChange {
            status: "enabled",
            name: name.to_string(),
            definition: Some(path),
            schedule: None,
            daemon,
        })
    }

    /// Unload but keep the plist so the job can be re-enabled as-is.
    pub async fn disable(&self, name: &str) -> Result<JobChange, SchedulerError> {
        registry::validate_name(name)?;
        let _lock = self.lock_existing(name)?;
        let mut records = self.store.load()?;
        let record = RegistryStore::find_mut(&mut records, name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;

        let daemon = if record.definition_path.exists() {
            DaemonStep::from_result(
                "unload",
                name,
                self.daemon.unload(&record.definition_path).await,
            )
        } else {
            DaemonStep::skipped("definition file missing; nothing to unload")
        };
        record.enabled = false;
        let path = record.definition_path.clone();
        if let Err(e) = self.store.save(&records) {
            tracing::warn!("Registry save failed for '{name}', loading again: {e}");
            if daemon.ok
                && let Err(load) = self.daemon.load(&path).await
            {
                tracing::warn!("Rollback load failed for '{name}': {load}");
            }
            return Err(e);
        }

        tracing::info!("Disabled job '{name}'");
        Ok(JobChange {
            status: "disabled",
            name: name.to_string(),
            definition: Some(path),
            schedule: None,
            daemon,
        })
    }

    /// All records in registry order, with live state when launchd answers.
    pub async fn list(&self) -> Result<JobList, SchedulerError> {
        let records = self.store.load()?;
        let live = match self.daemon.loaded_labels().await {
            Ok(labels) => Some(labels),
            Err(e) => {
                tracing::warn!("Could not query launchd, live state unknown: {e}");
                None
            }
        };

        let jobs: Vec<JobView> = records
            .into_iter()
            .map(|r| JobView {
                loaded: live.as_ref().map(|labels| labels.contains(&r.label)),
                schedule: r.schedule.summary(),
                command: r.command.chars().take(self.config.command_width).collect(),
                name: r.name,
                enabled: r.enabled,
                description: r.description,
            })
            .collect();

        Ok(JobList {
            count: jobs.len(),
            jobs,
            daemon_reachable: live.is_some(),
        })
    }

    /// Tail a job's log files. Works for removed jobs too.
    pub fn logs(&self, name: &str, lines: usize) -> Result<LogsReport, SchedulerError> {
        registry::validate_name(name)?;
        let tail = LogPaths::new(&self.config.logs_dir(), name).tail(lines)?;
        let message = tail
            .is_empty()
            .then(|| format!("No logs found for '{name}'"));
        Ok(LogsReport {
            name: name.to_string(),
            tail,
            message,
        })
    }
}
