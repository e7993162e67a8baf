//! Task lifecycle model.
//!
//! Every transition issues one control action and then re-derives the task's
//! state from a fresh status query. The model holds no state of its own;
//! what it returns is always an observation, never a prediction.

mod state;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

pub use state::{Task, TaskState};

use crate::HarnessError;
use crate::gateway::{CommandGateway, CtlAction};
use crate::parser::{ListingEntry, parse_listing, parse_status};
use crate::readiness::{DEFAULT_POLL_INTERVAL, ReadinessProbe, ReadinessWaiter};
use crate::transport::CommandResult;

/// Options for loading a task configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTaskOptions {
    /// Replace an already loaded task of the same name.
    pub overwrite: bool,
    /// Drop the configuration's dependencies.
    pub ignore_deps: bool,
    /// Replace the configuration's dependencies.
    pub override_deps: Option<String>,
}

/// Lifecycle operations on the tasks of one instance.
#[derive(Debug, Clone)]
pub struct TaskStateModel<'a> {
    gateway: CommandGateway<'a>,
    poll_interval: Duration,
}

impl<'a> TaskStateModel<'a> {
    /// Creates a model driving tasks through `gateway`.
    #[must_use]
    pub const fn new(gateway: CommandGateway<'a>) -> Self {
        Self {
            gateway,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interval between polls in [`Self::await_state`].
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The gateway this model issues commands through.
    #[must_use]
    pub const fn gateway(&self) -> &CommandGateway<'a> {
        &self.gateway
    }

    /// Queries the current state of `name`.
    ///
    /// A task the instance does not know is returned as
    /// [`TaskState::Unknown`] with pid `-1`; that is an observation, not an
    /// error. Only the control client's own "querying status failed" report
    /// counts as such.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] if the query could not be
    /// executed, [`HarnessError::CommandFailure`] for any other non-zero exit
    /// (missing client, sudo refusal, signal) and [`HarnessError::Parse`] if
    /// a successful response has no status line.
    pub fn query_state(&self, name: &str) -> Result<Task, HarnessError> {
        let action = CtlAction::Status(name.to_string());
        let result = self.gateway.run(&action)?;
        if is_unknown_task(&result, name) {
            debug!(task = %name, "task not known to instance");
            return Ok(Task::unknown(name));
        }
        let result = result.require_success(action.to_string())?;
        let record = parse_status(&result.stdout)?;
        let task = Task::from_status(name, &record);
        debug!(task = %name, state = %task.state, pid = task.pid, "observed task");
        Ok(task)
    }

    /// Lists every task the instance knows.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the listing command fails
    /// and [`HarnessError::Parse`] for any malformed row.
    pub fn list(&self) -> Result<Vec<ListingEntry>, HarnessError> {
        let action = CtlAction::List;
        let result = self
            .gateway
            .run(&action)?
            .require_success(action.to_string())?;
        Ok(parse_listing(&result.stdout)?)
    }

    /// Loads a task configuration file present on the target.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects it.
    pub fn add_task(
        &self,
        config_path: impl Into<PathBuf>,
        options: &AddTaskOptions,
    ) -> Result<(), HarnessError> {
        let action = CtlAction::AddTask {
            config_path: config_path.into(),
            overwrite: options.overwrite,
            ignore_deps: options.ignore_deps,
            override_deps: options.override_deps.clone(),
        };
        self.gateway
            .run(&action)?
            .require_success(action.to_string())?;
        info!(action = %action, "task added");
        Ok(())
    }

    /// Enables `name`. Enabling an enabled task is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects the
    /// action.
    pub fn enable(&self, name: &str) -> Result<Task, HarnessError> {
        self.transition(CtlAction::Enable(name.to_string()), name)
    }

    /// Disables `name`. Disabling a disabled task is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects the
    /// action.
    pub fn disable(&self, name: &str) -> Result<Task, HarnessError> {
        self.transition(CtlAction::Disable(name.to_string()), name)
    }

    /// Asks the task's process to terminate. Without a known pid this is a
    /// no-op that reports the current state.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects the
    /// action.
    pub fn stop(&self, name: &str) -> Result<Task, HarnessError> {
        self.signal(CtlAction::Stop(name.to_string()), name)
    }

    /// Forcibly terminates the task's process. Without a known pid this is a
    /// no-op that reports the current state.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects the
    /// action.
    pub fn kill(&self, name: &str) -> Result<Task, HarnessError> {
        self.signal(CtlAction::Kill(name.to_string()), name)
    }

    /// Resets a finished task so it can be scheduled again.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidTransition`] unless the task is `done`
    /// or `failed`, without issuing the restart.
    pub fn restart(&self, name: &str) -> Result<Task, HarnessError> {
        let current = self.query_state(name)?;
        if !current.state.is_terminal() {
            return Err(HarnessError::InvalidTransition {
                task: name.to_string(),
                action: "restart",
                from: current.state,
            });
        }
        self.transition(CtlAction::Restart(name.to_string()), name)
    }

    /// Sends an sd_notify-style report on behalf of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the instance rejects it.
    pub fn notify(&self, name: &str, message: &str) -> Result<Task, HarnessError> {
        self.transition(
            CtlAction::Notify {
                task: name.to_string(),
                message: message.to_string(),
            },
            name,
        )
    }

    /// Checks once that `name` is in `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StateMismatch`] with both states if it is not.
    pub fn check_state(&self, name: &str, expected: &TaskState) -> Result<Task, HarnessError> {
        let task = self.query_state(name)?;
        if task.state == *expected {
            Ok(task)
        } else {
            Err(HarnessError::StateMismatch {
                task: name.to_string(),
                expected: expected.clone(),
                observed: task.state,
                pid: task.pid,
            })
        }
    }

    /// Polls until `name` is in `expected` or `timeout` elapses.
    ///
    /// States match by exact equality. If the task is already in `expected`
    /// this returns after a single query.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] naming the last observed state, and
    /// transport or parse errors from any poll immediately.
    pub fn await_state(
        &self,
        name: &str,
        expected: &TaskState,
        timeout: Duration,
    ) -> Result<Task, HarnessError> {
        let mut probe = StateProbe {
            model: self,
            name,
            expected,
            last: None,
        };
        ReadinessWaiter::new(timeout)
            .with_interval(self.poll_interval)
            .wait(&mut probe)?;
        let task = probe.last.unwrap_or_else(|| Task::unknown(name));
        info!(task = %name, state = %task.state, "task reached expected state");
        Ok(task)
    }

    fn transition(&self, action: CtlAction, name: &str) -> Result<Task, HarnessError> {
        self.gateway
            .run(&action)?
            .require_success(action.to_string())?;
        let task = self.query_state(name)?;
        info!(action = %action, state = %task.state, pid = task.pid, "transition issued");
        Ok(task)
    }

    fn signal(&self, action: CtlAction, name: &str) -> Result<Task, HarnessError> {
        let current = self.query_state(name)?;
        if !current.has_pid() {
            warn!(action = %action, "task has no pid, nothing to signal");
            return Ok(current);
        }
        self.transition(action, name)
    }
}

/// Exit status of `crinit-ctl` for a failed action.
const CTL_EXIT_FAILURE: i32 = 1;

/// `crinit-ctl status` reports a task the instance does not know by exiting
/// 1 with this line on stderr.
fn is_unknown_task(result: &CommandResult, name: &str) -> bool {
    result.exit_status == CTL_EXIT_FAILURE
        && result
            .stderr
            .contains(&format!("Querying status of task '{name}' failed."))
}

/// Polls a task's state for [`TaskStateModel::await_state`].
struct StateProbe<'m, 'a> {
    model: &'m TaskStateModel<'a>,
    name: &'m str,
    expected: &'m TaskState,
    last: Option<Task>,
}

impl ReadinessProbe for StateProbe<'_, '_> {
    fn poll(&mut self) -> Result<bool, HarnessError> {
        let task = self.model.query_state(self.name)?;
        let matched = task.state == *self.expected;
        self.last = Some(task);
        Ok(matched)
    }

    fn describe(&self) -> String {
        format!("task '{}' to be {}", self.name, self.expected)
    }

    fn diagnostics(&mut self) -> Option<String> {
        self.last
            .as_ref()
            .map(|task| format!("task '{}' is {} (pid {})", task.name, task.state, task.pid))
    }
}
