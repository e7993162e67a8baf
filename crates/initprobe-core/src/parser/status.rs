//! `crinit-ctl status` response grammar.

use std::sync::LazyLock;

use regex::Regex;

use super::{ParseError, excerpt, parse_pid};

/// `status : <word> , pid : <signed integer>`, labels case-insensitive, fields
/// in that fixed order. `[^\S\n]` keeps a match on a single line.
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bstatus\b[^\S\n]*:[^\S\n]*(?P<state>\w+)[^\S\n]*,[^\S\n]*\bpid\b[^\S\n]*:[^\S\n]*(?P<pid>[+-]?\d+)",
    )
    .expect("status pattern is valid")
});

/// State word and pid extracted from a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// The state word, exactly as reported.
    pub state: String,
    /// The reported pid (`-1` when the task has no process).
    pub pid: i64,
}

/// Parses a status response.
///
/// The first line carrying a `status: <word>, pid: <n>` pair wins; any other
/// text around it is ignored.
///
/// # Errors
///
/// Returns [`ParseError::StatusLine`] if no line carries the pair (including
/// a missing `pid` field), or [`ParseError::InvalidPid`] if the pid does not
/// fit an `i64`.
pub fn parse_status(text: &str) -> Result<StatusRecord, ParseError> {
    let caps = STATUS_RE
        .captures(text)
        .ok_or_else(|| ParseError::StatusLine {
            input: excerpt(text),
        })?;

    Ok(StatusRecord {
        state: caps["state"].to_string(),
        pid: parse_pid(&caps["pid"])?,
    })
}
