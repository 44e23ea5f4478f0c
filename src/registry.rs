use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::schedule::Schedule;

/// One registered job. The registry file is a JSON array of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub label: String,
    pub command: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub description: String,
    pub definition_path: PathBuf,
    /// Whether the job should be loaded in launchd (intent, not live state).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Local>,
}

fn default_enabled() -> bool {
    true
}

/// Reject names that would escape the definitions/logs directories or collide
/// once turned into file names.
pub fn validate_name(name: &str) -> Result<(), SchedulerError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('.') {
        Some("name must not start with '.'")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        Some("only ASCII letters, digits, '.', '_' and '-' are allowed")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SchedulerError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

pub fn label_for(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

pub fn definition_path_for(launch_agents_dir: &Path, label: &str) -> PathBuf {
    launch_agents_dir.join(format!("{label}.plist"))
}

/// Whole-file JSON store; every save rewrites the full collection.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record in stored order. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<JobRecord>, SchedulerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| SchedulerError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<JobRecord> =
            serde_json::from_str(&content).map_err(|source| SchedulerError::RegistryCorrupt {
                path: self.path.clone(),
                source,
            })?;

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.name.as_str()) {
                return Err(SchedulerError::RegistryCorrupt {
                    path: self.path.clone(),
                    source: serde::de::Error::custom(format!(
                        "duplicate job name '{}'",
                        record.name
                    )),
                });
            }
        }
        Ok(records)
    }

    /// Atomically replace the registry file with `records`.
    pub fn save(&self, records: &[JobRecord]) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(records).map_err(|source| {
            SchedulerError::RegistryCorrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&tmp, json).map_err(|e| SchedulerError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SchedulerError::io(&self.path, e))?;
        tracing::debug!("Saved {} job(s) to {}", records.len(), self.path.display());
        Ok(())
    }

    pub fn find<'a>(records: &'a [JobRecord], name: &str) -> Option<&'a JobRecord> {
        records.iter().find(|r| r.name == name)
    }

    pub fn find_mut<'a>(records: &'a mut [JobRecord], name: &str) -> Option<&'a mut JobRecord> {
        records.iter_mut().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> JobRecord {
        let label = label_for("com.test.", name);
        JobRecord {
            name: name.to_string(),
            definition_path: definition_path_for(Path::new("/agents"), &label),
            label,
            command: format!("echo {name}"),
            schedule: Schedule::parse(r#"{"interval": 300}"#).unwrap(),
            description: String::new(),
            enabled: true,
            created_at: Local::now(),
        }
    }

    #[test]
    fn test_label_and_path_deterministic() {
        let a = label_for("com.test.", "backup");
        let b = label_for("com.test.", "backup");
        assert_eq!(a, b);
        assert_eq!(a, "com.test.backup");
        assert_eq!(
            definition_path_for(Path::new("/agents"), &a),
            PathBuf::from("/agents/com.test.backup.plist")
        );
    }

    #[test]
    fn test_distinct_names_distinct_paths() {
        let names = ["backup", "backup-2", "backup.2", "Backup", "b_ackup"];
        let paths: HashSet<_> = names
            .iter()
            .map(|n| definition_path_for(Path::new("/agents"), &label_for("p.", n)))
            .collect();
        assert_eq!(paths.len(), names.len());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("backup").is_ok());
        assert!(validate_name("sync.photos-2_daily").is_ok());
        for bad in ["", ".hidden", "a/b", "../etc", "has space", "ünï"] {
            assert!(
                matches!(validate_name(bad), Err(SchedulerError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("nested/registry.json"));
        let records = vec![record("zeta"), record("alpha"), record("mid")];
        store.save(&records).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, records);
        let names: Vec<_> = loaded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);

        // save(load()) leaves the content unchanged
        let before = std::fs::read_to_string(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let after = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(before, after);
        assert!(!dir.path().join("nested/registry.json.tmp").exists());
    }

    #[test]
    fn test_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = RegistryStore::new(path).load().unwrap_err();
        assert!(matches!(err, SchedulerError::RegistryCorrupt { .. }));
    }

    #[test]
    fn test_load_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let dup = vec![record("backup"), record("backup")];
        std::fs::write(&path, serde_json::to_string(&dup).unwrap()).unwrap();
        let err = RegistryStore::new(path).load().unwrap_err();
        assert!(err.to_string().contains("duplicate job name 'backup'"));
    }

    #[test]
    fn test_find() {
        let mut records = vec![record("a"), record("b")];
        assert_eq!(RegistryStore::find(&records, "b").unwrap().name, "b");
        assert!(RegistryStore::find(&records, "c").is_none());
        RegistryStore::find_mut(&mut records, "a").unwrap().enabled = false;
        assert!(!records[0].enabled);
    }
}
