//! Reading a process's capability sets from the kernel.

use std::path::PathBuf;

use tracing::debug;

use super::CapabilitySet;
use crate::HarnessError;
use crate::gateway::CommandGateway;
use crate::parser::{ProcCapabilities, parse_proc_status};

/// Where `/proc/<pid>/status` text comes from.
pub trait ProcStatusSource {
    /// Returns the status text of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ProcessNotFound`] if the process does not
    /// exist, so callers can tell an exited process from unreadable content.
    fn read_status(&self, pid: i64) -> Result<String, HarnessError>;
}

/// Reads status text on the target through the gateway's transport.
#[derive(Debug, Clone)]
pub struct RemoteProcStatus<'a> {
    gateway: CommandGateway<'a>,
}

impl<'a> RemoteProcStatus<'a> {
    /// Creates a source reading through `gateway`.
    #[must_use]
    pub const fn new(gateway: CommandGateway<'a>) -> Self {
        Self { gateway }
    }
}

impl ProcStatusSource for RemoteProcStatus<'_> {
    fn read_status(&self, pid: i64) -> Result<String, HarnessError> {
        if pid <= 0 {
            return Err(HarnessError::ProcessNotFound { pid });
        }
        let path = format!("/proc/{pid}/status");
        let result = self.gateway.exec(&format!(
            "cat {path} || {{ test -e /proc/{pid} && exit 1; exit {PROC_MISSING_EXIT}; }}"
        ))?;
        if result.success() {
            return Ok(result.stdout);
        }
        if result.exit_status == PROC_MISSING_EXIT {
            return Err(HarnessError::ProcessNotFound { pid });
        }
        Err(HarnessError::CommandFailure {
            action: format!("cat {path}"),
            exit_status: result.exit_status,
            stderr: result.stderr,
        })
    }
}

/// Exit status of the remote read when the process directory is gone after a
/// failed `cat`. Any other failure exits 1.
const PROC_MISSING_EXIT: i32 = 3;

/// Reads status text from a local proc filesystem.
///
/// The root is configurable so tests can point it at a fixture tree.
#[derive(Debug, Clone)]
pub struct LocalProcStatus {
    root: PathBuf,
}

impl LocalProcStatus {
    /// Reads from `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Reads from `<root>/<pid>/status`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for LocalProcStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcStatusSource for LocalProcStatus {
    fn read_status(&self, pid: i64) -> Result<String, HarnessError> {
        if pid <= 0 {
            return Err(HarnessError::ProcessNotFound { pid });
        }
        let path = self.root.join(pid.to_string()).join("status");
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HarnessError::ProcessNotFound { pid },
            _ => HarnessError::local_read(&path, e),
        })
    }
}

/// Extracts capability sets of running processes.
#[derive(Debug, Clone)]
pub struct ProcessCapabilityInspector<S> {
    source: S,
}

impl<S: ProcStatusSource> ProcessCapabilityInspector<S> {
    /// Creates an inspector reading from `source`.
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Effective capability set (`CapEff`) of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ProcessNotFound`] if the process has exited
    /// and [`HarnessError::Parse`] if the status text has no valid `CapEff`.
    pub fn effective_capabilities(&self, pid: i64) -> Result<CapabilitySet, HarnessError> {
        Ok(self.capabilities(pid)?.effective)
    }

    /// Every capability set the kernel reports for `pid`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::effective_capabilities`].
    pub fn capabilities(&self, pid: i64) -> Result<ProcCapabilities, HarnessError> {
        let text = self.source.read_status(pid)?;
        let caps = parse_proc_status(&text)?;
        debug!(pid, effective = %caps.effective, "read process capabilities");
        Ok(caps)
    }
}
