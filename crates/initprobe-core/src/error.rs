//! Harness error types.
//!
//! Every failure carries enough structured context (task name, expected vs
//! observed values, exit code and stderr) to diagnose a failed scenario
//! without re-running it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capability::CapabilitySet;
use crate::config::ConfigError;
use crate::parser::ParseError;
use crate::task::TaskState;
use crate::teardown::TeardownStep;

/// Errors produced by the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The command could not be executed at all (connection lost, ssh
    /// missing, spawn failure). Fatal to the current scenario.
    #[error("transport failure while running `{command}`: {reason}")]
    Transport {
        /// The command line that could not be executed.
        command: String,
        /// Why it could not be executed.
        reason: String,
    },

    /// The command executed but exited non-zero.
    #[error("`{action}` exited with status {exit_status}{}", format_stderr(.stderr))]
    CommandFailure {
        /// The action (e.g. `kill web`) that failed.
        action: String,
        /// Exit status reported by the remote command.
        exit_status: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// A file on the harness host could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    LocalRead {
        /// The file that was read.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Response text did not match the expected grammar.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A bounded wait expired.
    #[error(
        "timed out after {} waiting for {waited_for}{}",
        format_timeout(.timeout),
        format_diagnostic(.last_diagnostic)
    )]
    Timeout {
        /// Description of the awaited condition.
        waited_for: String,
        /// The caller-supplied timeout.
        timeout: Duration,
        /// Last observed diagnostic output, if any was captured.
        last_diagnostic: Option<String>,
    },

    /// The capability name is not in the host capability table.
    #[error("unknown capability '{name}' (table: {table})")]
    UnknownCapability {
        /// The unresolvable name.
        name: String,
        /// Description of the table that was consulted.
        table: String,
    },

    /// The capability resolved to a bit that no mask can hold.
    #[error("capability '{name}' resolves to bit {bit}, beyond the supported mask width")]
    CapabilityOutOfRange {
        /// The capability name.
        name: String,
        /// The resolved bit index.
        bit: u32,
    },

    /// The process vanished (or never existed) before it could be inspected.
    #[error("process {pid} not found")]
    ProcessNotFound {
        /// The process id that was looked up.
        pid: i64,
    },

    /// A task was observed in a different state than expected.
    #[error("task '{task}' is {observed} (pid {pid}), expected {expected}")]
    StateMismatch {
        /// The task name.
        task: String,
        /// The expected state.
        expected: TaskState,
        /// The observed state.
        observed: TaskState,
        /// The observed pid.
        pid: i64,
    },

    /// The effective capability set differs from the configured one.
    #[error("capability mismatch for pid {pid}: expected {expected}, observed {observed}")]
    CapabilityMismatch {
        /// The inspected process id.
        pid: i64,
        /// Bitmask assembled from the expected names.
        expected: CapabilitySet,
        /// Bitmask read from the process.
        observed: CapabilitySet,
    },

    /// A lifecycle transition was requested from a state that does not allow
    /// it.
    #[error("cannot {action} task '{task}' while it is {from}")]
    InvalidTransition {
        /// The task name.
        task: String,
        /// The requested action.
        action: &'static str,
        /// The state the task was in.
        from: TaskState,
    },

    /// Bulk teardown aborted on a single task.
    #[error("teardown aborted at {step}{}: {source}", format_task(.task))]
    Teardown {
        /// The task whose step failed; empty when the listing itself failed.
        task: String,
        /// The step that failed.
        step: TeardownStep,
        /// The underlying failure.
        #[source]
        source: Box<HarnessError>,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Returns `true` if the command could not be executed at all, as opposed
    /// to having executed and failed.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` for the ordinary "test failed" outcomes: an observed
    /// state or capability set that differs from the expected one.
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch { .. } | Self::CapabilityMismatch { .. }
        )
    }

    /// Returns `true` if a bounded wait expired.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn local_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

fn format_task(task: &str) -> String {
    if task.is_empty() {
        String::new()
    } else {
        format!(" of task '{task}'")
    }
}

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

fn format_diagnostic(diagnostic: &Option<String>) -> String {
    match diagnostic.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!("; last output:\n{text}"),
        _ => String::new(),
    }
}
