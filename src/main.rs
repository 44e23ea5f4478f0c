mod config;
mod daemon;
mod definition;
mod error;
mod lock;
mod logs;
mod registry;
mod schedule;
mod scheduler;

use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{Value, json};

use daemon::Launchctl;
use error::SchedulerError;
use schedule::Schedule;
use scheduler::Scheduler;

const SCHEDULE_HELP: &str = r#"Schedule JSON examples:
  '{"interval": 300}'                          every 5 minutes
  '{"calendar": {"hour": 9, "minute": 30}}'    daily at 09:30
  '{"calendar": {"weekday": 1, "hour": 10}}'   every Monday at 10:00
  '{"interval": 60, "run_at_load": true}'      every 60s, and once when loaded

If both "interval" and "calendar" are given, "interval" is used."#;

#[derive(Parser)]
#[command(
    name = "jobsched",
    version,
    about = "Recurring commands on launchd, tracked in a local registry",
    after_help = SCHEDULE_HELP
)]
struct Cli {
    /// Registry root (default ~/.jobsched)
    #[arg(long, global = true, env = config::ROOT_ENV)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the registry root and a default config.toml
    Init,
    /// Register a job, write its plist and load it
    Add {
        name: String,
        /// Shell command line, run via `<shell> -lc`
        command: String,
        /// Schedule as JSON, see examples below
        schedule: String,
        description: Option<String>,
    },
    /// Unload a job and delete it from the registry (logs are kept)
    Remove { name: String },
    /// Load a disabled job again
    Enable { name: String },
    /// Unload a job but keep it registered
    Disable { name: String },
    /// List registered jobs
    List,
    /// Show recent stdout/stderr lines for a job
    Logs {
        name: String,
        #[arg(default_value_t = logs::DEFAULT_TAIL_LINES)]
        lines: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::InvalidSubcommand
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            Cli::command().print_help()?;
            return Ok(());
        }
        Err(e) => match usage_error(&e) {
            Some(value) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                std::process::exit(1);
            }
            None => e.exit(),
        },
    };
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match dispatch(cli.root, command).await {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(e) => {
            let (message, kind) = match e.downcast_ref::<SchedulerError>() {
                Some(err) => (err.to_string(), err.kind()),
                None => (format!("{e:#}"), "internal"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"error": message, "kind": kind}))?
            );
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Argument errors become a `usage` error object. `--help` and `--version`
/// keep clap's own output.
fn usage_error(e: &clap::Error) -> Option<Value> {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        _ => {
            let message = e.render().to_string();
            Some(json!({"error": message.trim_end(), "kind": "usage"}))
        }
    }
}

async fn dispatch(root: Option<PathBuf>, command: Commands) -> Result<Value> {
    let cfg = config::load(root.as_deref())?;
    let scheduler = Scheduler::new(cfg, Launchctl);
    let value = match command {
        Commands::Init => {
            let cfg = scheduler.config();
            config::init_root(cfg)?;
            json!({"status": "initialized", "root": cfg.root})
        }
        Commands::Add {
            name,
            command,
            schedule,
            description,
        } => {
            let schedule = Schedule::parse(&schedule)?;
            let added = scheduler
                .add(&name, &command, schedule, description.as_deref().unwrap_or(""))
                .await?;
            serde_json::to_value(added)?
        }
        Commands::Remove { name } => serde_json::to_value(scheduler.remove(&name).await?)?,
        Commands::Enable { name } => serde_json::to_value(scheduler.enable(&name).await?)?,
        Commands::Disable { name } => serde_json::to_value(scheduler.disable(&name).await?)?,
        Commands::List => serde_json::to_value(scheduler.list().await?)?,
        Commands::Logs { name, lines } => serde_json::to_value(scheduler.logs(&name, lines)?)?,
    };
    Ok(value)
}
