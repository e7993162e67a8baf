//! initprobe-core - verification harness for a crinit-managed target.
//!
//! This library drives the `crinit-ctl` control surface of a running crinit
//! instance over a remote transport, interprets its textual responses, and
//! independently checks the Linux capability sets of the processes it
//! launched.
//!
//! # Modules
//!
//! - [`transport`]: how a shell command reaches the target (ssh session,
//!   local shell, or a scripted fake for tests)
//! - [`gateway`]: typed `crinit-ctl` actions on top of a transport
//! - [`parser`]: grammars for status, listing and `/proc/<pid>/status` text
//! - [`readiness`]: bounded polling of readiness conditions
//! - [`task`]: task lifecycle model and transitions
//! - [`teardown`]: bulk teardown of every tracked task
//! - [`capability`]: capability name resolution, inspection and verification
//! - [`instance`]: start/stop/reboot control of the init instance itself
//! - [`config`]: TOML target configuration
//!
//! # Example
//!
//! ```rust
//! use initprobe_core::gateway::{CommandGateway, ControlEndpoint, CtlAction};
//! use initprobe_core::task::{TaskState, TaskStateModel};
//! use initprobe_core::transport::ScriptedTransport;
//!
//! let transport = ScriptedTransport::new();
//! transport.respond("crinit-ctl status web", "Status: running, PID: 42\n");
//!
//! let gateway = CommandGateway::new(&transport, ControlEndpoint::default());
//! let model = TaskStateModel::new(gateway);
//!
//! let task = model.query_state("web").unwrap();
//! assert_eq!(task.state, TaskState::Running);
//! assert_eq!(task.pid, 42);
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod gateway;
pub mod instance;
pub mod parser;
pub mod readiness;
pub mod task;
pub mod teardown;
pub mod transport;

pub use error::HarnessError;
