use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ROOT_ENV: &str = "JOBSCHED_HOME";

/// Process-wide settings, resolved once and passed to the scheduler.
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry root: holds registry.json, the lock file and logs/.
    pub root: PathBuf,
    pub launch_agents_dir: PathBuf,
    pub label_prefix: String,
    pub shell: String,
    /// Max characters of a command shown by `list`.
    pub command_width: usize,
}

/// Optional overrides read from `<root>/config.toml`.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default = "default_label_prefix")]
    label_prefix: String,
    #[serde(default = "default_shell")]
    shell: String,
    #[serde(default)]
    launch_agents_dir: Option<String>,
    #[serde(default = "default_command_width")]
    command_width: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
            shell: default_shell(),
            launch_agents_dir: None,
            command_width: default_command_width(),
        }
    }
}

fn default_label_prefix() -> String {
    "com.jobsched.".to_string()
}

fn default_shell() -> String {
    "/bin/zsh".to_string()
}

fn default_command_width() -> usize {
    80
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jobsched")
}

fn default_launch_agents_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Library")
        .join("LaunchAgents")
}

impl Config {
    /// Defaults rooted at `root`, without consulting config.toml.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let file = FileConfig::default();
        Self {
            root: root.into(),
            launch_agents_dir: default_launch_agents_dir(),
            label_prefix: file.label_prefix,
            shell: file.shell,
            command_width: file.command_width,
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("registry.lock")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

/// Resolve the root (explicit path or default) and apply config.toml if present.
pub fn load(root: Option<&Path>) -> Result<Config> {
    let root = match root {
        Some(p) => expand_tilde(&p.to_string_lossy()),
        None => default_root(),
    };
    let mut cfg = Config::with_root(root);
    let path = cfg.config_file();
    if !path.exists() {
        return Ok(cfg);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let file: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    cfg.label_prefix = file.label_prefix;
    cfg.shell = file.shell;
    cfg.command_width = file.command_width;
    if let Some(dir) = file.launch_agents_dir {
        cfg.launch_agents_dir = expand_tilde(&dir);
    }
    Ok(cfg)
}

/// Create the registry root with a commented config.toml. Safe to re-run.
pub fn init_root(config: &Config) -> Result<()> {
    std::fs::create_dir_all(config.logs_dir())
        .with_context(|| format!("Failed to create {}", config.logs_dir().display()))?;

    let path = config.config_file();
    if !path.exists() {
        std::fs::write(
            &path,
            r#"# jobsched settings; every key is optional.

# Prefix prepended to a job name to form its launchd label.
label_prefix = "com.jobsched."

# Shell used to run commands (invoked as <shell> -lc "<command>").
shell = "/bin/zsh"

# Where per-job property lists are written.
# launch_agents_dir = "~/Library/LaunchAgents"

# Command column width in `jobsched list`.
command_width = 80
"#,
        )
        .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
