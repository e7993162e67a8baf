//! Typed `crinit-ctl` invocations.
//!
//! [`CtlAction`] is the closed set of actions the control client supports,
//! each with its own parameters. [`CommandGateway`] renders an action into a
//! self-contained command line, binds it to the instance's control socket and
//! executes it through a [`Transport`].
//!
//! ```text
//! export CRINIT_SOCK=/tmp/crinit-itest.sock; crinit-ctl addtask -f /tmp/t/web.crinit
//! ```
//!
//! A non-zero exit is returned as a [`CommandResult`], never as an error;
//! only a transport failure is an `Err`.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::HarnessError;
use crate::config::InitConfig;
use crate::transport::quote::{quote, quote_path};
use crate::transport::{CommandResult, Transport};

/// Where and how the control client reaches the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    /// Control client binary.
    pub ctl_binary: String,
    /// Environment variable selecting the socket.
    pub socket_env: String,
    /// Control socket path.
    pub socket_path: PathBuf,
    /// Pass `-v` to the client.
    pub verbose: bool,
}

impl Default for ControlEndpoint {
    fn default() -> Self {
        Self::from(&InitConfig::default())
    }
}

impl From<&InitConfig> for ControlEndpoint {
    fn from(init: &InitConfig) -> Self {
        Self {
            ctl_binary: init.ctl_binary.clone(),
            socket_env: init.socket_env.clone(),
            socket_path: init.socket_path.clone(),
            verbose: init.verbose,
        }
    }
}

/// A `crinit-ctl` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtlAction {
    /// Load a task configuration file (absolute path on the target).
    AddTask {
        /// Task configuration file.
        config_path: PathBuf,
        /// Replace an already loaded task of the same name.
        overwrite: bool,
        /// Drop the file's dependencies.
        ignore_deps: bool,
        /// Replace the file's dependencies (`"dep:event dep:event"`).
        override_deps: Option<String>,
    },
    /// Remove the `@ctl:enable` dependency.
    Enable(String),
    /// Add the `@ctl:enable` dependency.
    Disable(String),
    /// SIGTERM the task's process, if it has one.
    Stop(String),
    /// SIGKILL the task's process, if it has one.
    Kill(String),
    /// Reset the status bits of a finished task.
    Restart(String),
    /// Query status bits and pid.
    Status(String),
    /// Send an sd_notify-style report on behalf of a task.
    Notify {
        /// Task name.
        task: String,
        /// Notify string, e.g. `READY=1` or `MAINPID=42`.
        message: String,
    },
    /// List every known task.
    List,
    /// Graceful reboot.
    Reboot,
    /// Graceful shutdown.
    Poweroff,
}

impl CtlAction {
    /// The action word on the command line.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::AddTask { .. } => "addtask",
            Self::Enable(_) => "enable",
            Self::Disable(_) => "disable",
            Self::Stop(_) => "stop",
            Self::Kill(_) => "kill",
            Self::Restart(_) => "restart",
            Self::Status(_) => "status",
            Self::Notify { .. } => "notify",
            Self::List => "list",
            Self::Reboot => "reboot",
            Self::Poweroff => "poweroff",
        }
    }

    /// The task the action targets, if any.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Enable(task)
            | Self::Disable(task)
            | Self::Stop(task)
            | Self::Kill(task)
            | Self::Restart(task)
            | Self::Status(task)
            | Self::Notify { task, .. } => Some(task),
            Self::AddTask { .. } | Self::List | Self::Reboot | Self::Poweroff => None,
        }
    }

    /// Quoted arguments following the verb.
    fn args(&self) -> Vec<String> {
        match self {
            Self::AddTask {
                config_path,
                overwrite,
                ignore_deps,
                override_deps,
            } => {
                let mut args = Vec::new();
                if *overwrite {
                    args.push("-f".to_string());
                }
                if *ignore_deps {
                    args.push("-i".to_string());
                }
                if let Some(deps) = override_deps {
                    args.push("-d".to_string());
                    args.push(quote(deps));
                }
                args.push(quote_path(config_path));
                args
            },
            Self::Notify { task, message } => vec![quote(task), quote(message)],
            Self::Enable(task)
            | Self::Disable(task)
            | Self::Stop(task)
            | Self::Kill(task)
            | Self::Restart(task)
            | Self::Status(task) => vec![quote(task)],
            Self::List | Self::Reboot | Self::Poweroff => Vec::new(),
        }
    }
}

/// `verb [task]`, as used in logs and error messages.
impl fmt::Display for CtlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            Self::AddTask { config_path, .. } => write!(f, " {}", config_path.display()),
            _ => match self.task() {
                Some(task) => write!(f, " {task}"),
                None => Ok(()),
            },
        }
    }
}

/// Executes control actions against one instance.
#[derive(Clone)]
pub struct CommandGateway<'a> {
    transport: &'a dyn Transport,
    endpoint: ControlEndpoint,
}

impl fmt::Debug for CommandGateway<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGateway")
            .field("transport", &self.transport.describe())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl<'a> CommandGateway<'a> {
    /// Creates a gateway issuing commands through `transport`.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, endpoint: ControlEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// The endpoint commands are bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Where commands run.
    #[must_use]
    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Renders the full command line for `action`.
    #[must_use]
    pub fn render(&self, action: &CtlAction) -> String {
        let mut line = format!(
            "export {}={}; {} {}",
            self.endpoint.socket_env,
            quote_path(&self.endpoint.socket_path),
            quote(&self.endpoint.ctl_binary),
            action.verb()
        );
        if self.endpoint.verbose {
            line.push_str(" -v");
        }
        for arg in action.args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    /// Runs one control action.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] only if the command could not be
    /// executed; a non-zero exit is `Ok`.
    pub fn run(&self, action: &CtlAction) -> Result<CommandResult, HarnessError> {
        let result = self.exec(&self.render(action))?;
        debug!(
            action = %action,
            exit_status = result.exit_status,
            "control action finished"
        );
        Ok(result)
    }

    /// Runs an arbitrary script on the target with the same transport and
    /// privileges as control actions.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] only if the command could not be
    /// executed.
    pub fn exec(&self, script: &str) -> Result<CommandResult, HarnessError> {
        self.transport.execute(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn render(action: &CtlAction) -> String {
        let transport = ScriptedTransport::new();
        CommandGateway::new(&transport, ControlEndpoint::default()).render(action)
    }

    #[test]
    fn test_render_status() {
        assert_eq!(
            render(&CtlAction::Status("web".to_string())),
            "export CRINIT_SOCK=/tmp/crinit-itest.sock; crinit-ctl status web"
        );
    }

    #[test]
    fn test_render_list_has_no_arguments() {
        assert_eq!(
            render(&CtlAction::List),
            "export CRINIT_SOCK=/tmp/crinit-itest.sock; crinit-ctl list"
        );
    }

    #[test]
    fn test_render_addtask_flags() {
        let action = CtlAction::AddTask {
            config_path: PathBuf::from("/tmp/crinit-itest/web.crinit"),
            overwrite: true,
            ignore_deps: true,
            override_deps: Some("net:wait dbus:spawn".to_string()),
        };
        assert!(render(&action).ends_with(
            "crinit-ctl addtask -f -i -d 'net:wait dbus:spawn' /tmp/crinit-itest/web.crinit"
        ));
    }

    #[test]
    fn test_render_quotes_hostile_task_names() {
        let line = render(&CtlAction::Kill("a; rm -rf /".to_string()));
        assert!(line.ends_with("crinit-ctl kill 'a; rm -rf /'"));
    }

    #[test]
    fn test_render_notify() {
        let action = CtlAction::Notify {
            task: "web".to_string(),
            message: "MAINPID=42".to_string(),
        };
        let line = render(&action);
        assert!(line.contains("crinit-ctl notify web "));
        assert!(line.contains("MAINPID=42"));

        let ready = CtlAction::Notify {
            task: "web".to_string(),
            message: "READY=1 STATUS=up".to_string(),
        };
        assert!(render(&ready).ends_with("notify web 'READY=1 STATUS=up'"));
    }

    #[test]
    fn test_render_verbose_and_custom_endpoint() {
        let transport = ScriptedTransport::new();
        let endpoint = ControlEndpoint {
            ctl_binary: "/usr/bin/crinit-ctl".to_string(),
            socket_env: "CRINIT_SOCK".to_string(),
            socket_path: PathBuf::from("/run/crinit dir/sock"),
            verbose: true,
        };
        let gateway = CommandGateway::new(&transport, endpoint);
        assert_eq!(
            gateway.render(&CtlAction::Reboot),
            "export CRINIT_SOCK='/run/crinit dir/sock'; /usr/bin/crinit-ctl reboot -v"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(CtlAction::Disable("alpha".to_string()).to_string(), "disable alpha");
        assert_eq!(CtlAction::Poweroff.to_string(), "poweroff");
        let add = CtlAction::AddTask {
            config_path: PathBuf::from("/t/x.crinit"),
            overwrite: false,
            ignore_deps: false,
            override_deps: None,
        };
        assert_eq!(add.to_string(), "addtask /t/x.crinit");
    }

    #[test]
    fn test_non_zero_exit_is_not_an_error() {
        let transport = ScriptedTransport::new();
        transport.respond_with(
            "crinit-ctl kill web",
            CommandResult::failed(1, "Killing task 'web' failed.\n"),
        );
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        let result = gateway.run(&CtlAction::Kill("web".to_string())).unwrap();
        assert_eq!(result.exit_status, 1);
        assert!(result.stderr.contains("Killing task"));
    }

    #[test]
    fn test_transport_failure_is_an_error() {
        let transport = ScriptedTransport::new();
        transport.fail_transport("crinit-ctl");
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        let err = gateway.run(&CtlAction::List).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_one_execution_per_action() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl enable", "");
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        gateway.run(&CtlAction::Enable("web".to_string())).unwrap();
        assert_eq!(transport.calls().len(), 1);
    }
}
