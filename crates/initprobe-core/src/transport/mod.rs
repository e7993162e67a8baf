//! How a shell command reaches the target.
//!
//! A [`Transport`] executes one complete, self-contained shell command on the
//! target and returns its stdout, stderr and exit status. A non-zero exit is
//! a value, not an error; only a command that could not be executed at all
//! yields [`HarnessError::Transport`].
//!
//! Implementations:
//!
//! - [`SshSession`]: multiplexed OpenSSH connection, opened and closed
//!   explicitly
//! - [`LocalTransport`]: `sh -c` on the local machine
//! - [`ScriptedTransport`]: canned responses with a call log, for tests
//!
//! [`Session`] bundles the first two behind one value built from a
//! [`TargetConfig`](crate::config::TargetConfig).

mod local;
pub mod quote;
mod scripted;
mod ssh;

use std::io::Write;
use std::process::{Command, Stdio};

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

pub use local::LocalTransport;
pub use scripted::ScriptedTransport;
pub use ssh::SshSession;

use crate::HarnessError;
use crate::config::{TargetConfig, TransportKind};

/// Output of one command executed on the target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status. Termination by signal `n` is reported as `128 + n`.
    pub exit_status: i32,
}

impl CommandResult {
    /// A successful result with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed result with the given exit status and stderr.
    #[must_use]
    pub fn failed(exit_status: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    /// Returns `true` if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Converts a non-zero exit into [`HarnessError::CommandFailure`].
    ///
    /// `action` names what was attempted, for the error message.
    pub fn require_success(self, action: impl Into<String>) -> Result<Self, HarnessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(HarnessError::CommandFailure {
                action: action.into(),
                exit_status: self.exit_status,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes shell commands on the target.
pub trait Transport {
    /// Executes `script` on the target and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] only if the command could not be
    /// executed. A command that ran and exited non-zero is `Ok`.
    fn execute(&self, script: &str) -> Result<CommandResult, HarnessError>;

    /// Human-readable description of where commands run (for logs).
    fn describe(&self) -> String;
}

/// How commands acquire the privileges needed to drive the init system.
#[derive(Debug, Default)]
pub enum Privilege {
    /// Run as the session user (already root).
    #[default]
    Inherit,
    /// Run through `sudo`, feeding the password on stdin when one is set.
    Sudo {
        /// The sudo password, if sudo asks for one.
        password: Option<SecretString>,
    },
}

impl Privilege {
    /// Wraps `script` for this privilege level.
    #[must_use]
    pub fn wrap(&self, script: &str) -> String {
        match self {
            Self::Inherit => script.to_string(),
            Self::Sudo { .. } => format!("sudo -S -p '' {}", quote::sh_c(script)),
        }
    }

    /// Bytes to feed on stdin, if any.
    fn stdin(&self) -> Option<&SecretString> {
        match self {
            Self::Sudo { password } => password.as_ref(),
            Self::Inherit => None,
        }
    }
}

/// Runs a prepared [`Command`] to completion and captures its output.
///
/// `described` is the command line as it should appear in errors and logs.
fn run_command(
    cmd: &mut Command,
    stdin: Option<&SecretString>,
    described: &str,
) -> Result<CommandResult, HarnessError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| HarnessError::transport(described, format!("failed to spawn: {e}")))?;

    if let Some(secret) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let mut line = secret.expose_secret().as_bytes().to_vec();
            line.push(b'\n');
            // sudo may not read stdin at all (cached credentials); a closed
            // pipe is not an error here.
            let _ = pipe.write_all(&line);
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| HarnessError::transport(described, format!("failed to wait: {e}")))?;

    let exit_status = exit_code(output.status);
    debug!(command = %described, exit_status, "command finished");

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_status,
    })
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

/// An open connection to the target, built from configuration.
///
/// Lifecycle is `open -> use -> close`. Dropping an open session closes it,
/// so the connection is released on every exit path.
#[derive(Debug)]
pub enum Session {
    /// Multiplexed OpenSSH connection.
    Ssh(SshSession),
    /// Local shell.
    Local(LocalTransport),
}

impl Session {
    /// Opens a session for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the sudo password cannot be
    /// resolved and [`HarnessError::Transport`] if the connection cannot be
    /// established.
    pub fn open(config: &TargetConfig) -> Result<Self, HarnessError> {
        let privilege = config.privilege.resolve()?;
        match config.target.transport {
            TransportKind::Ssh => SshSession::open(&config.target, privilege).map(Self::Ssh),
            TransportKind::Local => Ok(Self::Local(LocalTransport::new(privilege))),
        }
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] if the connection could not be
    /// shut down cleanly.
    pub fn close(self) -> Result<(), HarnessError> {
        match self {
            Self::Ssh(ssh) => ssh.close(),
            Self::Local(_) => Ok(()),
        }
    }
}

impl Transport for Session {
    fn execute(&self, script: &str) -> Result<CommandResult, HarnessError> {
        match self {
            Self::Ssh(ssh) => ssh.execute(script),
            Self::Local(local) => local.execute(script),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Ssh(ssh) => ssh.describe(),
            Self::Local(local) => local.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_success_passes_zero_exit() {
        let result = CommandResult::ok("NAME PID\n");
        let result = result.require_success("list").unwrap();
        assert_eq!(result.stdout, "NAME PID\n");
    }

    #[test]
    fn test_require_success_converts_non_zero_exit() {
        let err = CommandResult::failed(1, "no such task")
            .require_success("kill web")
            .unwrap_err();
        match err {
            HarnessError::CommandFailure {
                action,
                exit_status,
                stderr,
            } => {
                assert_eq!(action, "kill web");
                assert_eq!(exit_status, 1);
                assert_eq!(stderr, "no such task");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_inherit_privilege_leaves_script_alone() {
        assert_eq!(Privilege::Inherit.wrap("crinit-ctl list"), "crinit-ctl list");
        assert!(Privilege::Inherit.stdin().is_none());
    }

    #[test]
    fn test_sudo_privilege_wraps_in_shell() {
        let privilege = Privilege::Sudo {
            password: Some(SecretString::from("hunter2".to_string())),
        };
        let wrapped = privilege.wrap("export CRINIT_SOCK=/tmp/s; crinit-ctl list");
        assert_eq!(
            wrapped,
            "sudo -S -p '' sh -c 'export CRINIT_SOCK=/tmp/s; crinit-ctl list'"
        );
        assert!(privilege.stdin().is_some());
    }

    #[test]
    fn test_privilege_debug_does_not_leak_password() {
        let privilege = Privilege::Sudo {
            password: Some(SecretString::from("hunter2".to_string())),
        };
        assert!(!format!("{privilege:?}").contains("hunter2"));
    }
}
