//! Boundary to launchd. Everything OS-specific goes through [`Daemon`].

use std::collections::HashSet;
use std::path::Path;

use tokio::process::Command;

use crate::error::DaemonError;

#[async_trait::async_trait]
pub trait Daemon: Send + Sync {
    /// Ask the daemon to load a job definition.
    async fn load(&self, definition: &Path) -> Result<(), DaemonError>;
    /// Ask the daemon to unload a job definition.
    async fn unload(&self, definition: &Path) -> Result<(), DaemonError>;
    /// Labels of every job the daemon currently has loaded.
    async fn loaded_labels(&self) -> Result<HashSet<String>, DaemonError>;
}

/// Drives the per-user launchd domain through the `launchctl` CLI.
#[derive(Debug, Default)]
pub struct Launchctl;

impl Launchctl {
    async fn run(&self, action: &'static str, args: &[&str]) -> Result<String, DaemonError> {
        let output = Command::new("launchctl").args(args).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        // `launchctl load` can exit 0 and still report a failure on stderr.
        if output.status.success() && !stderr.contains("failed") {
            Ok(stdout)
        } else {
            Err(DaemonError::Refused {
                action,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl Daemon for Launchctl {
    async fn load(&self, definition: &Path) -> Result<(), DaemonError> {
        let path = definition.to_string_lossy();
        self.run("load", &["load", &*path]).await?;
        tracing::info!("launchctl loaded {}", definition.display());
        Ok(())
    }

    async fn unload(&self, definition: &Path) -> Result<(), DaemonError> {
        let path = definition.to_string_lossy();
        self.run("unload", &["unload", &*path]).await?;
        tracing::info!("launchctl unloaded {}", definition.display());
        Ok(())
    }

    async fn loaded_labels(&self) -> Result<HashSet<String>, DaemonError> {
        let stdout = self.run("list", &["list"]).await?;
        Ok(parse_list_output(&stdout))
    }
}

/// `launchctl list` prints `PID\tStatus\tLabel` rows after a header line.
fn parse_list_output(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter(|line| !line.starts_with("PID"))
        .filter_map(|line| line.split('\t').nth(2))
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect()
}
