//! Per-job launchd property lists.

use std::path::{Path, PathBuf};

use crate::error::SchedulerError;
use crate::logs::LogPaths;
use crate::registry::definition_path_for;
use crate::schedule::NativeSchedule;

/// Everything rendered into one job's plist.
#[derive(Debug)]
pub struct JobDefinition<'a> {
    pub label: &'a str,
    pub shell: &'a str,
    pub command: &'a str,
    pub schedule: &'a NativeSchedule,
    pub logs: &'a LogPaths,
}

impl JobDefinition<'_> {
    /// Render the plist XML. The command runs as `<shell> -lc <command>`.
    pub fn render(&self) -> String {
        let mut plist = String::new();
        plist.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        plist.push_str("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n");
        plist.push_str("<plist version=\"1.0\">\n");
        plist.push_str("<dict>\n");

        plist.push_str("    <key>Label</key>\n");
        plist.push_str(&format!("    <string>{}</string>\n", escape_xml(self.label)));

        plist.push_str("    <key>ProgramArguments</key>\n");
        plist.push_str("    <array>\n");
        for arg in [self.shell, "-lc", self.command] {
            plist.push_str(&format!("        <string>{}</string>\n", escape_xml(arg)));
        }
        plist.push_str("    </array>\n");

        plist.push_str("    <key>StandardOutPath</key>\n");
        plist.push_str(&format!(
            "    <string>{}</string>\n",
            escape_xml(&self.logs.stdout.to_string_lossy())
        ));
        plist.push_str("    <key>StandardErrorPath</key>\n");
        plist.push_str(&format!(
            "    <string>{}</string>\n",
            escape_xml(&self.logs.stderr.to_string_lossy())
        ));

        if let Some(secs) = self.schedule.start_interval {
            plist.push_str("    <key>StartInterval</key>\n");
            plist.push_str(&format!("    <integer>{secs}</integer>\n"));
        } else if let Some(cal) = self.schedule.start_calendar_interval {
            plist.push_str("    <key>StartCalendarInterval</key>\n");
            plist.push_str("    <dict>\n");
            for (key, value) in cal.native_entries() {
                plist.push_str(&format!("        <key>{key}</key>\n"));
                plist.push_str(&format!("        <integer>{value}</integer>\n"));
            }
            plist.push_str("    </dict>\n");
        }

        if self.schedule.run_at_load {
            plist.push_str("    <key>RunAtLoad</key>\n");
            plist.push_str("    <true/>\n");
        }

        plist.push_str("</dict>\n");
        plist.push_str("</plist>\n");
        plist
    }
}

/// Writes and deletes plists under the launch agents directory.
#[derive(Debug)]
pub struct DefinitionWriter {
    launch_agents_dir: PathBuf,
}

impl DefinitionWriter {
    pub fn new(launch_agents_dir: PathBuf) -> Self {
        Self { launch_agents_dir }
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        definition_path_for(&self.launch_agents_dir, label)
    }

    /// Create the log and definition directories, then write the plist.
    pub fn write(&self, def: &JobDefinition<'_>) -> Result<PathBuf, SchedulerError> {
        for dir in [def.logs.stdout.parent(), def.logs.stderr.parent()]
            .into_iter()
            .flatten()
        {
            std::fs::create_dir_all(dir).map_err(|e| SchedulerError::io(dir, e))?;
        }
        std::fs::create_dir_all(&self.launch_agents_dir)
            .map_err(|e| SchedulerError::io(&self.launch_agents_dir, e))?;

        let path = self.path_for(def.label);
        std::fs::write(&path, def.render()).map_err(|e| SchedulerError::io(&path, e))?;
        tracing::info!("Wrote job definition {}", path.display());
        Ok(path)
    }

    /// Remove a plist. Missing files are fine.
    pub fn delete(&self, path: &Path) -> Result<(), SchedulerError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Removed job definition {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SchedulerError::io(path, e)),
        }
    }

    /// Put back plist bytes captured before a delete.
    pub fn restore(&self, path: &Path, contents: &[u8]) -> Result<(), SchedulerError> {
        std::fs::write(path, contents).map_err(|e| SchedulerError::io(path, e))?;
        tracing::info!("Restored job definition {}", path.display());
        Ok(())
    }
}

/// Escape special characters for XML.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
