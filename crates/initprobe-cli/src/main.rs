//! initprobe - crinit verification harness
//!
//! Drives a crinit instance on a target host and asserts facts about it:
//! task states, teardown, and the capability sets of task processes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use initprobe_core::HarnessError;
use initprobe_core::config::TargetConfig;
use initprobe_core::instance::InitInstance;
use initprobe_core::transport::Session;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// Exit codes.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// Any failure, including a failed verification.
    pub const FAILURE: u8 = 1;
    /// A bounded wait elapsed.
    pub const TIMEOUT: u8 = 2;
}

/// initprobe - crinit verification harness
#[derive(Parser, Debug)]
#[command(name = "initprobe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to target configuration file
    #[arg(short, long, default_value = "initprobe.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Configuration ===
    /// Print a default configuration file
    InitConfig,

    // === Instance lifecycle ===
    /// Start the init instance and wait for its control socket
    Start,

    /// Tear down every task, then stop the init instance
    Stop,

    /// Exit successfully if the init instance is running
    IsRunning,

    /// Disable and kill every task that has a process
    Teardown,

    /// Ask the instance to reboot the target
    Reboot,

    /// Ask the instance to power the target off
    Poweroff,

    // === Tasks ===
    /// List loaded tasks
    #[command(alias = "ls")]
    List,

    /// Show the state of a task
    Status {
        /// Task name
        task: String,
    },

    /// Enable a task
    Enable {
        /// Task name
        task: String,
    },

    /// Disable a task
    Disable {
        /// Task name
        task: String,
    },

    /// Stop a task's process
    StopTask {
        /// Task name
        task: String,
    },

    /// Kill a task's process
    Kill {
        /// Task name
        task: String,
    },

    /// Restart a task that is done or failed
    Restart {
        /// Task name
        task: String,
    },

    /// Load a task configuration file present on the target
    AddTask {
        /// Configuration file, relative to the task directory unless absolute
        file: PathBuf,

        /// Replace an already loaded task of the same name
        #[arg(short = 'f', long)]
        overwrite: bool,

        /// Ignore the configuration's dependencies
        #[arg(short = 'i', long, conflicts_with = "override_deps")]
        ignore_deps: bool,

        /// Replace the configuration's dependencies
        #[arg(short = 'd', long, value_name = "DEPS")]
        override_deps: Option<String>,
    },

    /// Send a notification on behalf of a task
    Notify {
        /// Task name
        task: String,

        /// Notification string, e.g. READY=1
        message: String,
    },

    /// Wait until a task reaches a state
    Await {
        /// Task name
        task: String,

        /// Expected state (running, done, failed, stopped, ...)
        state: String,

        /// How long to wait [default: timeouts.state from the configuration]
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },

    // === Capabilities ===
    /// Resolve, inspect and verify process capabilities
    #[command(subcommand)]
    Caps(commands::caps::CapsCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    if matches!(cli.command, Commands::InitConfig) {
        return commands::config::init_config();
    }

    let config = load_config(&cli.config)?;
    let session = Session::open(&config).context("failed to open session to target")?;
    let instance = InitInstance::from_config(&session, &config);

    let result = dispatch(cli, &instance, &config);
    let closed = session.close().context("failed to close session");
    result?;
    closed
}

fn load_config(path: &std::path::Path) -> Result<TargetConfig> {
    TargetConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn dispatch(cli: &Cli, instance: &InitInstance<'_>, config: &TargetConfig) -> Result<()> {
    let json = cli.json;
    match &cli.command {
        Commands::InitConfig => commands::config::init_config(),
        Commands::Start => commands::instance::start(instance),
        Commands::Stop => commands::instance::stop(instance, json),
        Commands::IsRunning => commands::instance::is_running(instance),
        Commands::Teardown => commands::instance::teardown(instance, json),
        Commands::Reboot => commands::instance::reboot(instance),
        Commands::Poweroff => commands::instance::poweroff(instance),
        Commands::List => commands::task::list(instance, json),
        Commands::Status { task } => commands::task::status(instance, task, json),
        Commands::Enable { task } => commands::task::enable(instance, task, json),
        Commands::Disable { task } => commands::task::disable(instance, task, json),
        Commands::StopTask { task } => commands::task::stop(instance, task, json),
        Commands::Kill { task } => commands::task::kill(instance, task, json),
        Commands::Restart { task } => commands::task::restart(instance, task, json),
        Commands::AddTask {
            file,
            overwrite,
            ignore_deps,
            override_deps,
        } => commands::task::add_task(
            instance,
            file,
            &initprobe_core::task::AddTaskOptions {
                overwrite: *overwrite,
                ignore_deps: *ignore_deps,
                override_deps: override_deps.clone(),
            },
        ),
        Commands::Notify { task, message } => {
            commands::task::notify(instance, task, message, json)
        },
        Commands::Await {
            task,
            state,
            timeout,
        } => commands::task::await_state(
            instance,
            task,
            state,
            timeout.unwrap_or(config.timeouts.state),
            json,
        ),
        Commands::Caps(cmd) => commands::caps::run_caps(cmd, instance, json),
    }
}

/// Maps an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    let timed_out = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<HarnessError>())
        .any(HarnessError::is_timeout);
    if timed_out {
        exit_codes::TIMEOUT
    } else {
        exit_codes::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_await_with_timeout() {
        let cli = Cli::try_parse_from(["initprobe", "await", "web", "running", "--timeout", "5s"])
            .unwrap();
        match cli.command {
            Commands::Await {
                task,
                state,
                timeout,
            } => {
                assert_eq!(task, "web");
                assert_eq!(state, "running");
                assert_eq!(timeout, Some(Duration::from_secs(5)));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_add_task_flags() {
        let cli = Cli::try_parse_from(["initprobe", "add-task", "web.crinit", "-f", "-d", "net"])
            .unwrap();
        match cli.command {
            Commands::AddTask {
                file,
                overwrite,
                ignore_deps,
                override_deps,
            } => {
                assert_eq!(file, PathBuf::from("web.crinit"));
                assert!(overwrite);
                assert!(!ignore_deps);
                assert_eq!(override_deps.as_deref(), Some("net"));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ignore_and_override_deps_conflict() {
        let result =
            Cli::try_parse_from(["initprobe", "add-task", "web.crinit", "-i", "-d", "net"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_flag_is_global() {
        let cli = Cli::try_parse_from(["initprobe", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_timeout_maps_to_exit_code() {
        let timeout = anyhow::Error::new(HarnessError::Timeout {
            waited_for: "control socket /tmp/s".to_string(),
            timeout: Duration::from_secs(1),
            last_diagnostic: None,
        })
        .context("failed to start instance");
        assert_eq!(exit_code(&timeout), exit_codes::TIMEOUT);

        let failure = anyhow::anyhow!("crinit is not running");
        assert_eq!(exit_code(&failure), exit_codes::FAILURE);
    }

    #[test]
    fn test_load_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initprobe.toml");
        std::fs::write(&path, "[target]\ntransport = \"local\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.target.transport,
            initprobe_core::config::TransportKind::Local
        );
    }
}
