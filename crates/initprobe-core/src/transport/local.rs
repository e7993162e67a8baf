//! Local shell transport.

use std::process::Command;

use super::{CommandResult, Privilege, Transport, run_command};
use crate::HarnessError;

/// Runs commands with `sh -c` on the machine the harness runs on.
///
/// Used when the harness is deployed onto the target itself.
#[derive(Debug, Default)]
pub struct LocalTransport {
    privilege: Privilege,
}

impl LocalTransport {
    /// Creates a local transport with the given privilege level.
    #[must_use]
    pub const fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }
}

impl Transport for LocalTransport {
    fn execute(&self, script: &str) -> Result<CommandResult, HarnessError> {
        let wrapped = self.privilege.wrap(script);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&wrapped);
        run_command(&mut cmd, self.privilege.stdin(), script)
    }

    fn describe(&self) -> String {
        "local shell".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_captures_stdout() {
        let transport = LocalTransport::default();
        let result = transport.execute("echo hello").unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_non_zero_exit_is_a_value() {
        let transport = LocalTransport::default();
        let result = transport.execute("echo oops >&2; exit 3").unwrap();
        assert_eq!(result.exit_status, 3);
        assert_eq!(result.stderr, "oops\n");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_signal_exit_maps_above_128() {
        let transport = LocalTransport::default();
        let result = transport.execute("kill -TERM $$").unwrap();
        assert_eq!(result.exit_status, 128 + 15);
    }

    #[test]
    fn test_describe() {
        assert_eq!(LocalTransport::default().describe(), "local shell");
    }
}
