//! Canned-response transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CommandResult, Transport};
use crate::HarnessError;

#[derive(Debug)]
enum Reply {
    Result(CommandResult),
    TransportFailure,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

/// A [`Transport`] that answers from a script instead of running anything.
///
/// Responses are registered against a needle; a command is answered by the
/// first rule whose needle is a substring of it. Registering the same needle
/// again queues another reply: replies are consumed in order and the last
/// one repeats forever. A command no rule matches is a transport error.
///
/// Every executed command is recorded and can be inspected with
/// [`ScriptedTransport::calls`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    /// Creates a transport with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands containing `needle` with a successful result.
    pub fn respond(&self, needle: &str, stdout: &str) -> &Self {
        self.push(needle, Reply::Result(CommandResult::ok(stdout)))
    }

    /// Answers commands containing `needle` with `result`.
    pub fn respond_with(&self, needle: &str, result: CommandResult) -> &Self {
        self.push(needle, Reply::Result(result))
    }

    /// Fails commands containing `needle` as if the target were unreachable.
    pub fn fail_transport(&self, needle: &str) -> &Self {
        self.push(needle, Reply::TransportFailure)
    }

    /// Commands executed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of executed commands containing `needle`.
    #[must_use]
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    fn push(&self, needle: &str, reply: Reply) -> &Self {
        let mut state = self.lock();
        if let Some(rule) = state.rules.iter_mut().find(|r| r.needle == needle) {
            rule.replies.push_back(reply);
        } else {
            state.rules.push(Rule {
                needle: needle.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
        drop(state);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread cannot leave the state half-updated.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, script: &str) -> Result<CommandResult, HarnessError> {
        let mut state = self.lock();
        state.calls.push(script.to_string());

        let Some(rule) = state.rules.iter_mut().find(|r| script.contains(&r.needle)) else {
            return Err(HarnessError::transport(script, "no scripted response"));
        };

        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            None
        };
        let reply = reply.as_ref().or_else(|| rule.replies.front());

        match reply {
            Some(Reply::Result(result)) => Ok(result.clone()),
            Some(Reply::TransportFailure) => {
                Err(HarnessError::transport(script, "scripted transport failure"))
            },
            None => Err(HarnessError::transport(script, "no scripted response")),
        }
    }

    fn describe(&self) -> String {
        "scripted transport".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_substring() {
        let transport = ScriptedTransport::new();
        transport.respond("crinit-ctl list", "NAME PID\n");

        let result = transport
            .execute("export CRINIT_SOCK=/tmp/s; crinit-ctl list")
            .unwrap();
        assert_eq!(result.stdout, "NAME PID\n");
        assert_eq!(transport.calls_matching("list"), 1);
    }

    #[test]
    fn test_replies_are_consumed_then_last_repeats() {
        let transport = ScriptedTransport::new();
        transport
            .respond("status", "Status: running, PID: 1\n")
            .respond("status", "Status: done, PID: -1\n");

        assert!(transport.execute("status a").unwrap().stdout.contains("running"));
        assert!(transport.execute("status a").unwrap().stdout.contains("done"));
        assert!(transport.execute("status a").unwrap().stdout.contains("done"));
    }

    #[test]
    fn test_unmatched_command_is_transport_error() {
        let transport = ScriptedTransport::new();
        let err = transport.execute("crinit-ctl list").unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.calls(), vec!["crinit-ctl list".to_string()]);
    }

    #[test]
    fn test_fail_transport() {
        let transport = ScriptedTransport::new();
        transport.fail_transport("kill");
        assert!(transport.execute("crinit-ctl kill a").unwrap_err().is_transport());
    }

    #[test]
    fn test_first_registered_rule_wins() {
        let transport = ScriptedTransport::new();
        transport
            .respond_with("disable alpha", CommandResult::failed(1, "busy"))
            .respond("disable", "");

        assert_eq!(transport.execute("disable alpha").unwrap().exit_status, 1);
        assert!(transport.execute("disable beta").unwrap().success());
    }
}
