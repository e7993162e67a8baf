//! Bounded polling.
//!
//! [`ReadinessWaiter`] polls a [`ReadinessProbe`] at a fixed interval until
//! it reports ready or the caller's timeout elapses. There is no unbounded
//! wait: every wait in the harness goes through here. On timeout the probe's
//! last diagnostic output is attached to the error.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::HarnessError;
use crate::gateway::CommandGateway;
use crate::transport::quote::quote_path;

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest diagnostic tail kept from a log file.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// A condition polled until it holds.
pub trait ReadinessProbe {
    /// Checks the condition once.
    ///
    /// # Errors
    ///
    /// An error ends the wait immediately; it is not retried.
    fn poll(&mut self) -> Result<bool, HarnessError>;

    /// What is being waited for, e.g. `control socket /tmp/crinit.sock`.
    fn describe(&self) -> String;

    /// Output that helps explain why the condition never held. Called once,
    /// after the wait has timed out.
    fn diagnostics(&mut self) -> Option<String> {
        None
    }
}

/// Any `FnMut() -> bool` is a probe without diagnostics.
impl<F> ReadinessProbe for F
where
    F: FnMut() -> bool,
{
    fn poll(&mut self) -> Result<bool, HarnessError> {
        Ok(self())
    }

    fn describe(&self) -> String {
        "readiness condition".to_string()
    }
}

/// Result of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Number of polls, including the successful one.
    pub polls: u32,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Polls a probe until ready or timed out.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessWaiter {
    timeout: Duration,
    interval: Duration,
}

impl ReadinessWaiter {
    /// Creates a waiter bounded by `timeout`, polling every
    /// [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Polls `probe` until it reports ready.
    ///
    /// The probe is polled at least once, even with a zero timeout. Between
    /// polls the waiter sleeps for the interval, or for what is left of the
    /// timeout if that is shorter.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] with the probe's diagnostics if the
    /// timeout elapses, and any error from the probe unchanged.
    pub fn wait<P: ReadinessProbe + ?Sized>(&self, probe: &mut P) -> Result<Ready, HarnessError> {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls = polls.saturating_add(1);
            if probe.poll()? {
                let ready = Ready {
                    polls,
                    elapsed: start.elapsed(),
                };
                debug!(
                    condition = %probe.describe(),
                    polls,
                    elapsed_ms = ready.elapsed.as_millis(),
                    "condition ready"
                );
                return Ok(ready);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(HarnessError::Timeout {
                    waited_for: probe.describe(),
                    timeout: self.timeout,
                    last_diagnostic: probe.diagnostics(),
                });
            }

            thread::sleep(self.interval.min(self.timeout - elapsed));
        }
    }
}

/// Waits for a control socket to appear on the target.
///
/// On timeout the tail of the init system's log file, if configured, is the
/// diagnostic.
#[derive(Debug)]
pub struct SocketProbe<'g, 'a> {
    gateway: &'g CommandGateway<'a>,
    socket_path: PathBuf,
    log_path: Option<PathBuf>,
}

impl<'g, 'a> SocketProbe<'g, 'a> {
    /// Probes for `socket_path` through `gateway`.
    #[must_use]
    pub fn new(gateway: &'g CommandGateway<'a>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            socket_path: socket_path.into(),
            log_path: None,
        }
    }

    /// Reads `log_path` for diagnostics on timeout.
    #[must_use]
    pub fn with_log(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }
}

impl ReadinessProbe for SocketProbe<'_, '_> {
    fn poll(&mut self) -> Result<bool, HarnessError> {
        let result = self
            .gateway
            .exec(&format!("test -S {}", quote_path(&self.socket_path)))?;
        Ok(result.success())
    }

    fn describe(&self) -> String {
        format!("control socket {}", self.socket_path.display())
    }

    fn diagnostics(&mut self) -> Option<String> {
        let log_path = self.log_path.as_ref()?;
        let result = self
            .gateway
            .exec(&format!(
                "tail -c {MAX_DIAGNOSTIC_BYTES} {}",
                quote_path(log_path)
            ))
            .ok()?;
        let text = if result.success() {
            result.stdout
        } else {
            result.stderr
        };
        info!(log = %log_path.display(), "collected diagnostics after timeout");
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ControlEndpoint;
    use crate::transport::{CommandResult, ScriptedTransport};

    #[test]
    fn test_ready_on_third_poll() {
        let mut calls = 0;
        let mut probe = || {
            calls += 1;
            calls >= 3
        };

        let interval = Duration::from_millis(5);
        let ready = ReadinessWaiter::new(interval * 20)
            .with_interval(interval)
            .wait(&mut probe)
            .unwrap();
        assert_eq!(ready.polls, 3);
    }

    #[test]
    fn test_timeout_shorter_than_interval() {
        let mut calls = 0;
        let mut probe = || {
            calls += 1;
            calls >= 3
        };

        let interval = Duration::from_millis(50);
        let err = ReadinessWaiter::new(Duration::from_millis(10))
            .with_interval(interval)
            .wait(&mut probe)
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(calls < 3);
    }

    #[test]
    fn test_zero_timeout_still_polls_once() {
        let mut probe = || true;
        let ready = ReadinessWaiter::new(Duration::ZERO)
            .wait(&mut probe)
            .unwrap();
        assert_eq!(ready.polls, 1);
    }

    #[test]
    fn test_probe_error_ends_wait() {
        struct Broken;
        impl ReadinessProbe for Broken {
            fn poll(&mut self) -> Result<bool, HarnessError> {
                Err(HarnessError::transport("test -S /s", "connection reset"))
            }

            fn describe(&self) -> String {
                "broken".to_string()
            }
        }

        let err = ReadinessWaiter::new(Duration::from_secs(5))
            .wait(&mut Broken)
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_socket_probe_ready() {
        let transport = ScriptedTransport::new();
        transport
            .respond_with("test -S /tmp/crinit-itest.sock", CommandResult::failed(1, ""))
            .respond("test -S /tmp/crinit-itest.sock", "");
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        let mut probe = SocketProbe::new(&gateway, "/tmp/crinit-itest.sock");
        let ready = ReadinessWaiter::new(Duration::from_secs(1))
            .with_interval(Duration::from_millis(1))
            .wait(&mut probe)
            .unwrap();
        assert_eq!(ready.polls, 2);
    }

    #[test]
    fn test_socket_probe_timeout_surfaces_log() {
        let transport = ScriptedTransport::new();
        transport
            .respond_with("test -S", CommandResult::failed(1, ""))
            .respond(
                "tail -c 4096 /tmp/crinit-itest.log",
                "crinit: could not bind socket: Permission denied\n",
            );
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        let mut probe =
            SocketProbe::new(&gateway, "/tmp/crinit-itest.sock").with_log("/tmp/crinit-itest.log");
        let err = ReadinessWaiter::new(Duration::from_millis(10))
            .with_interval(Duration::from_millis(2))
            .wait(&mut probe)
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("control socket /tmp/crinit-itest.sock"), "{message}");
        assert!(message.contains("could not bind socket"), "{message}");
    }

    #[test]
    fn test_socket_probe_without_log_has_bare_timeout() {
        let transport = ScriptedTransport::new();
        transport.respond_with("test -S", CommandResult::failed(1, ""));
        let gateway = CommandGateway::new(&transport, ControlEndpoint::default());

        let err = ReadinessWaiter::new(Duration::ZERO)
            .wait(&mut SocketProbe::new(&gateway, "/tmp/s"))
            .unwrap_err();
        match err {
            HarnessError::Timeout {
                last_diagnostic, ..
            } => assert!(last_diagnostic.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
