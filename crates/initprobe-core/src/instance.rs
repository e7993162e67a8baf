//! Control of the init instance under test.
//!
//! The harness starts its own crinit instance on a private control socket,
//! drives it through [`TaskStateModel`], and tears it down again at the end
//! of a scenario.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::HarnessError;
use crate::config::{InitConfig, TargetConfig, TimeoutConfig};
use crate::gateway::{CommandGateway, ControlEndpoint, CtlAction};
use crate::readiness::{Ready, ReadinessWaiter, SocketProbe};
use crate::task::{AddTaskOptions, TaskStateModel};
use crate::teardown::{BulkTeardownOrchestrator, TeardownReport};
use crate::transport::Transport;
use crate::transport::quote::{quote, quote_path};

/// Result of [`InitInstance::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// An instance was already running; nothing was started.
    AlreadyRunning,
    /// A new instance was started and its socket appeared.
    Started(Ready),
}

/// Result of [`InitInstance::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// No instance was running.
    NotRunning,
    /// Every task was torn down and the instance killed.
    Stopped(TeardownReport),
}

/// A crinit instance on the target.
#[derive(Debug, Clone)]
pub struct InitInstance<'a> {
    gateway: CommandGateway<'a>,
    init: InitConfig,
    timeouts: TimeoutConfig,
}

impl<'a> InitInstance<'a> {
    /// Creates a controller for the instance described by `init`.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, init: InitConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            gateway: CommandGateway::new(transport, ControlEndpoint::from(&init)),
            init,
            timeouts,
        }
    }

    /// Creates a controller from a full configuration.
    #[must_use]
    pub fn from_config(transport: &'a dyn Transport, config: &TargetConfig) -> Self {
        Self::new(transport, config.init.clone(), config.timeouts)
    }

    /// The gateway bound to this instance's control socket.
    #[must_use]
    pub const fn gateway(&self) -> &CommandGateway<'a> {
        &self.gateway
    }

    /// Task lifecycle operations against this instance.
    #[must_use]
    pub fn tasks(&self) -> TaskStateModel<'a> {
        TaskStateModel::new(self.gateway.clone()).with_poll_interval(self.timeouts.poll_interval)
    }

    /// Bulk teardown against this instance.
    #[must_use]
    pub fn teardown(&self) -> BulkTeardownOrchestrator<'a> {
        BulkTeardownOrchestrator::new(self.gateway.clone())
    }

    /// Returns `true` if an init process is running on the target.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if `pgrep` itself fails.
    pub fn is_running(&self) -> Result<bool, HarnessError> {
        let script = format!("pgrep -x {}", quote(self.process_name()));
        let result = self.gateway.exec(&script)?;
        match result.exit_status {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(HarnessError::CommandFailure {
                action: script,
                exit_status: result.exit_status,
                stderr: result.stderr,
            }),
        }
    }

    /// Starts the instance unless one is already running, then waits for its
    /// control socket.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] with the init log as diagnostic if
    /// the socket does not appear within the readiness timeout.
    pub fn start(&self) -> Result<StartOutcome, HarnessError> {
        if self.is_running()? {
            info!("init instance already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let script = format!(
            "export {}={}; nohup {} >{} 2>&1 </dev/null &",
            self.init.socket_env,
            quote_path(&self.init.socket_path),
            quote_path(&self.init.init_binary),
            quote_path(&self.init.log_path),
        );
        self.gateway
            .exec(&script)?
            .require_success(format!("start {}", self.init.init_binary.display()))?;

        let mut probe = SocketProbe::new(&self.gateway, &self.init.socket_path)
            .with_log(&self.init.log_path);
        let ready = ReadinessWaiter::new(self.timeouts.ready)
            .with_interval(self.timeouts.poll_interval)
            .wait(&mut probe)?;
        info!(
            socket = %self.init.socket_path.display(),
            elapsed_ms = ready.elapsed.as_millis(),
            "init instance ready"
        );
        Ok(StartOutcome::Started(ready))
    }

    /// Tears down every task, then kills the instance and removes its socket.
    ///
    /// A teardown failure aborts before the instance is killed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Teardown`] if a task could not be torn down and
    /// [`HarnessError::CommandFailure`] if the instance could not be killed.
    pub fn stop(&self) -> Result<StopOutcome, HarnessError> {
        if !self.is_running()? {
            return Ok(StopOutcome::NotRunning);
        }

        let report = self.teardown().teardown_all()?;

        let script = format!(
            "pkill -x {} && rm -f {}",
            quote(self.process_name()),
            quote_path(&self.init.socket_path)
        );
        self.gateway
            .exec(&script)?
            .require_success(format!("stop {}", self.init.init_binary.display()))?;
        info!(stopped = report.stopped.len(), "init instance stopped");
        Ok(StopOutcome::Stopped(report))
    }

    /// Requests a graceful reboot.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the request is rejected.
    pub fn reboot(&self) -> Result<(), HarnessError> {
        self.request(&CtlAction::Reboot)
    }

    /// Requests a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the request is rejected.
    pub fn poweroff(&self) -> Result<(), HarnessError> {
        self.request(&CtlAction::Poweroff)
    }

    /// Loads a task configuration already present on the target. A relative
    /// path is taken relative to the configured task directory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects it.
    pub fn add_task(&self, config: &Path, options: &AddTaskOptions) -> Result<(), HarnessError> {
        self.tasks().add_task(self.task_path(config), options)
    }

    fn task_path(&self, config: &Path) -> PathBuf {
        if config.is_absolute() {
            config.to_path_buf()
        } else {
            self.init.task_dir.join(config)
        }
    }

    fn request(&self, action: &CtlAction) -> Result<(), HarnessError> {
        self.gateway
            .run(action)?
            .require_success(action.to_string())?;
        info!(action = %action, "request accepted");
        Ok(())
    }

    fn process_name(&self) -> &str {
        self.init
            .init_binary
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("crinit")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::{CommandResult, ScriptedTransport};

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig {
            ready: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            state: Duration::from_millis(50),
        }
    }

    fn instance(transport: &ScriptedTransport) -> InitInstance<'_> {
        InitInstance::new(transport, InitConfig::default(), timeouts())
    }

    #[test]
    fn test_is_running() {
        let transport = ScriptedTransport::new();
        transport.respond("pgrep -x crinit", "1\n");
        assert!(instance(&transport).is_running().unwrap());

        let transport = ScriptedTransport::new();
        transport.respond_with("pgrep -x crinit", CommandResult::failed(1, ""));
        assert!(!instance(&transport).is_running().unwrap());
    }

    #[test]
    fn test_is_running_pgrep_error() {
        let transport = ScriptedTransport::new();
        transport.respond_with("pgrep", CommandResult::failed(2, "pgrep: bad option"));
        let err = instance(&transport).is_running().unwrap_err();
        assert!(matches!(err, HarnessError::CommandFailure { exit_status: 2, .. }));
    }

    #[test]
    fn test_start_when_running_is_noop() {
        let transport = ScriptedTransport::new();
        transport.respond("pgrep -x crinit", "1\n");

        let outcome = instance(&transport).start().unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyRunning);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_start_launches_and_waits_for_socket() {
        let transport = ScriptedTransport::new();
        transport
            .respond_with("pgrep -x crinit", CommandResult::failed(1, ""))
            .respond("nohup /sbin/crinit", "")
            .respond_with("test -S /tmp/crinit-itest.sock", CommandResult::failed(1, ""))
            .respond("test -S /tmp/crinit-itest.sock", "");

        let outcome = instance(&transport).start().unwrap();
        assert!(matches!(outcome, StartOutcome::Started(Ready { polls: 2, .. })));

        let calls = transport.calls();
        assert_eq!(
            calls[1],
            "export CRINIT_SOCK=/tmp/crinit-itest.sock; nohup /sbin/crinit >/tmp/crinit-itest.log 2>&1 </dev/null &"
        );
    }

    #[test]
    fn test_start_timeout_surfaces_init_log() {
        let transport = ScriptedTransport::new();
        transport
            .respond_with("pgrep -x crinit", CommandResult::failed(1, ""))
            .respond("nohup /sbin/crinit", "")
            .respond_with("test -S", CommandResult::failed(1, ""))
            .respond("tail -c", "crinit: Could not load series file.\n");

        let err = instance(&transport).start().unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("Could not load series file"));
    }

    #[test]
    fn test_stop_when_not_running_is_noop() {
        let transport = ScriptedTransport::new();
        transport.respond_with("pgrep -x crinit", CommandResult::failed(1, ""));

        assert_eq!(instance(&transport).stop().unwrap(), StopOutcome::NotRunning);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_stop_tears_down_then_kills_instance() {
        let transport = ScriptedTransport::new();
        transport
            .respond("pgrep -x crinit", "1\n")
            .respond("crinit-ctl list", "NAME PID\nweb 42\n")
            .respond("crinit-ctl disable web", "")
            .respond("crinit-ctl kill web", "")
            .respond("pkill -x crinit", "");

        let outcome = instance(&transport).stop().unwrap();
        match outcome {
            StopOutcome::Stopped(report) => assert_eq!(report.stopped, vec!["web"]),
            StopOutcome::NotRunning => panic!("expected a stop"),
        }
        let calls = transport.calls();
        assert_eq!(
            calls.last().map(String::as_str),
            Some("pkill -x crinit && rm -f /tmp/crinit-itest.sock")
        );
    }

    #[test]
    fn test_stop_teardown_failure_keeps_instance() {
        let transport = ScriptedTransport::new();
        transport
            .respond("pgrep -x crinit", "1\n")
            .respond("crinit-ctl list", "NAME PID\nweb 42\n")
            .respond_with("crinit-ctl disable web", CommandResult::failed(1, ""));

        let err = instance(&transport).stop().unwrap_err();
        assert!(matches!(err, HarnessError::Teardown { .. }));
        assert_eq!(transport.calls_matching("pkill"), 0);
    }

    #[test]
    fn test_reboot_and_poweroff() {
        let transport = ScriptedTransport::new();
        transport
            .respond("crinit-ctl reboot", "")
            .respond_with("crinit-ctl poweroff", CommandResult::failed(1, "denied"));

        let instance = instance(&transport);
        instance.reboot().unwrap();
        assert!(matches!(
            instance.poweroff().unwrap_err(),
            HarnessError::CommandFailure { .. }
        ));
    }

    #[test]
    fn test_add_task_resolves_relative_paths() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl addtask", "");

        let instance = instance(&transport);
        instance
            .add_task(Path::new("web.crinit"), &AddTaskOptions::default())
            .unwrap();
        instance
            .add_task(Path::new("/etc/crinit/db.crinit"), &AddTaskOptions::default())
            .unwrap();

        assert_eq!(
            transport.calls_matching("crinit-ctl addtask /tmp/crinit-itest/web.crinit"),
            1
        );
        assert_eq!(
            transport.calls_matching("crinit-ctl addtask /etc/crinit/db.crinit"),
            1
        );
    }
}
