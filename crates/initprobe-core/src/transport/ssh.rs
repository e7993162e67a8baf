//! OpenSSH transport.
//!
//! One control master is started when the session opens and every command
//! is multiplexed over it, so a scenario pays for the handshake once.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};

use super::{CommandResult, Privilege, Transport, exit_code, run_command};
use crate::HarnessError;
use crate::config::TargetSection;

/// Exit status ssh itself uses for connection and protocol errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// A multiplexed ssh connection to the target.
#[derive(Debug)]
pub struct SshSession {
    destination: String,
    port: u16,
    identity_file: Option<PathBuf>,
    connect_timeout: Duration,
    control_path: PathBuf,
    privilege: Privilege,
    open: bool,
}

impl SshSession {
    /// Starts the control master.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] if `ssh` cannot be spawned or the
    /// connection cannot be established.
    pub fn open(target: &TargetSection, privilege: Privilege) -> Result<Self, HarnessError> {
        let control_path = target.control_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("initprobe-{}.ctl", std::process::id()))
        });

        let mut session = Self {
            destination: target.destination(),
            port: target.port,
            identity_file: target.identity_file.clone(),
            connect_timeout: target.connect_timeout,
            control_path,
            privilege,
            open: false,
        };

        // The backgrounded master inherits stdio, so nothing is piped; ssh's
        // own messages go to a log file instead.
        let log_path = session.control_path.with_extension("log");
        let mut cmd = session.base_command();
        cmd.args(["-M", "-f", "-N", "-E"])
            .arg(&log_path)
            .arg(&session.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let described = format!("ssh -M {}", session.destination);
        let status = cmd
            .status()
            .map_err(|e| HarnessError::transport(&described, format!("failed to spawn: {e}")))?;
        if !status.success() {
            let log = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(HarnessError::transport(
                described,
                format!(
                    "control master exited with status {}: {}",
                    exit_code(status),
                    log.trim()
                ),
            ));
        }

        session.open = true;
        info!(target = %session.describe(), "ssh session opened");
        Ok(session)
    }

    /// Stops the control master.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] if the master could not be asked
    /// to exit.
    pub fn close(mut self) -> Result<(), HarnessError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), HarnessError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let mut cmd = self.base_command();
        cmd.args(["-O", "exit"]).arg(&self.destination);
        let described = format!("ssh -O exit {}", self.destination);
        let result = run_command(&mut cmd, None, &described)?;
        if !result.success() {
            return Err(HarnessError::transport(
                described,
                format!("exited with status {}", result.exit_status),
            ));
        }
        info!(target = %self.describe(), "ssh session closed");
        Ok(())
    }

    /// Options shared by every invocation.
    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(&self.control_path)
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(self.port.to_string());
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd
    }
}

impl Transport for SshSession {
    fn execute(&self, script: &str) -> Result<CommandResult, HarnessError> {
        if !self.open {
            return Err(HarnessError::transport(script, "ssh session is closed"));
        }

        let mut cmd = self.base_command();
        cmd.arg(&self.destination)
            .arg("--")
            .arg(self.privilege.wrap(script));
        let result = run_command(&mut cmd, self.privilege.stdin(), script)?;

        if result.exit_status == SSH_CONNECTION_ERROR {
            return Err(HarnessError::transport(
                script,
                format!("ssh connection error: {}", result.stderr.trim()),
            ));
        }
        Ok(result)
    }

    fn describe(&self) -> String {
        format!("ssh {}:{}", self.destination, self.port)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to close ssh session");
        }
    }
}
