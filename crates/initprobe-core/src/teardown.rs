//! Bulk teardown of every task of an instance.
//!
//! The listing is taken once. Each task with a process is then disabled and
//! killed, strictly in that order and one task at a time: disabling first
//! keeps the instance from re-dispatching the task while it is being killed.
//! Tasks without a process are skipped.
//!
//! The first failing step aborts the teardown. A partially torn down
//! instance is never reported as success.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::HarnessError;
use crate::gateway::{CommandGateway, CtlAction};
use crate::task::TaskStateModel;

/// A step of the teardown, for error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    /// Taking the task listing.
    List,
    /// Disabling a task.
    Disable,
    /// Killing a task.
    Kill,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::Disable => "disable",
            Self::Kill => "kill",
        })
    }
}

/// Outcome of a completed teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Tasks that were disabled and killed, in order.
    pub stopped: Vec<String>,
    /// Tasks that had no process and were left alone.
    pub skipped: Vec<String>,
}

/// Brings every task of an instance to a non-running state.
#[derive(Debug, Clone)]
pub struct BulkTeardownOrchestrator<'a> {
    gateway: CommandGateway<'a>,
}

impl<'a> BulkTeardownOrchestrator<'a> {
    /// Creates an orchestrator issuing commands through `gateway`.
    #[must_use]
    pub const fn new(gateway: CommandGateway<'a>) -> Self {
        Self { gateway }
    }

    /// Disables and kills every task that has a process.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Teardown`] naming the task and step that
    /// failed; no later task is touched. A listing that cannot be taken or
    /// parsed is reported with an empty task name and the `list` step.
    pub fn teardown_all(&self) -> Result<TeardownReport, HarnessError> {
        let entries = TaskStateModel::new(self.gateway.clone())
            .list()
            .map_err(|source| teardown_error("", TeardownStep::List, source))?;

        let mut report = TeardownReport::default();
        for entry in entries {
            if !entry.is_running() {
                debug!(task = %entry.name, "no process, skipping");
                report.skipped.push(entry.name);
                continue;
            }

            self.step(
                &entry.name,
                &CtlAction::Disable(entry.name.clone()),
                TeardownStep::Disable,
            )?;
            self.step(
                &entry.name,
                &CtlAction::Kill(entry.name.clone()),
                TeardownStep::Kill,
            )?;
            info!(task = %entry.name, pid = entry.pid, "task torn down");
            report.stopped.push(entry.name);
        }

        info!(
            stopped = report.stopped.len(),
            skipped = report.skipped.len(),
            "teardown complete"
        );
        Ok(report)
    }

    fn step(&self, task: &str, action: &CtlAction, step: TeardownStep) -> Result<(), HarnessError> {
        self.gateway
            .run(action)
            .and_then(|result| result.require_success(action.to_string()))
            .map(drop)
            .map_err(|source| teardown_error(task, step, source))
    }
}

fn teardown_error(task: &str, step: TeardownStep, source: HarnessError) -> HarnessError {
    HarnessError::Teardown {
        task: task.to_string(),
        step,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ControlEndpoint;
    use crate::transport::{CommandResult, ScriptedTransport};

    fn orchestrator(transport: &ScriptedTransport) -> BulkTeardownOrchestrator<'_> {
        BulkTeardownOrchestrator::new(CommandGateway::new(transport, ControlEndpoint::default()))
    }

    #[test]
    fn test_empty_listing() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl list", "NAME PID\n");

        let report = orchestrator(&transport).teardown_all().unwrap();
        assert_eq!(report, TeardownReport::default());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_all_stopped_tasks_are_skipped() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl list", "NAME PID\na -1\nb -1\n");

        let report = orchestrator(&transport).teardown_all().unwrap();
        assert!(report.stopped.is_empty());
        assert_eq!(report.skipped, vec!["a", "b"]);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_list_failure_is_reported_as_list_step() {
        let transport = ScriptedTransport::new();
        transport.respond_with("crinit-ctl list", CommandResult::failed(1, "no socket"));

        let err = orchestrator(&transport).teardown_all().unwrap_err();
        match err {
            HarnessError::Teardown { task, step, source } => {
                assert!(task.is_empty());
                assert_eq!(step, TeardownStep::List);
                assert!(matches!(*source, HarnessError::CommandFailure { .. }));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_listing_aborts_before_any_action() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl list", "NAME PID\na 10\ngarbage\n");

        let err = orchestrator(&transport).teardown_all().unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Teardown {
                step: TeardownStep::List,
                ..
            }
        ));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_disable_failure_skips_kill() {
        let transport = ScriptedTransport::new();
        transport
            .respond("crinit-ctl list", "NAME PID\na 10\n")
            .respond_with("crinit-ctl disable a", CommandResult::failed(1, "busy"));

        let err = orchestrator(&transport).teardown_all().unwrap_err();
        assert!(matches!(
            &err,
            HarnessError::Teardown { task, step: TeardownStep::Disable, .. } if task == "a"
        ));
        assert_eq!(transport.calls_matching("crinit-ctl kill"), 0);
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_kill_failure_is_reported_as_kill_step() {
        let transport = ScriptedTransport::new();
        transport
            .respond("crinit-ctl list", "NAME PID\na 10\nb 11\n")
            .respond("crinit-ctl disable a", "")
            .respond_with(
                "crinit-ctl kill a",
                CommandResult::failed(1, "Killing task 'a' failed.\n"),
            );

        let err = orchestrator(&transport).teardown_all().unwrap_err();
        match err {
            HarnessError::Teardown { task, step, source } => {
                assert_eq!(task, "a");
                assert_eq!(step, TeardownStep::Kill);
                assert!(matches!(
                    *source,
                    HarnessError::CommandFailure { ref action, .. } if action == "kill a"
                ));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls_matching("crinit-ctl list"), 1);
        assert_eq!(transport.calls_matching("crinit-ctl disable b"), 0);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(TeardownStep::Disable.to_string(), "disable");
        assert_eq!(TeardownStep::Kill.to_string(), "kill");
    }
}
