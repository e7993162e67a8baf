//! Grammars for the text the target hands back.
//!
//! The exact formatting of `crinit-ctl` output is not a stable contract, so
//! the status grammar is tolerant of whitespace, letter case and surrounding
//! text. Anything that does not fit the grammar is a [`ParseError`]; nothing is
//! silently defaulted.
//!
//! - [`parse_status`]: `Status: <word>, PID: <signed int>`
//! - [`parse_listing`]: `NAME ...` header followed by `<name> <pid> ...` rows
//! - [`parse_proc_status`]: kernel `/proc/<pid>/status` capability fields

mod listing;
mod proc_status;
mod status;

use thiserror::Error;

pub use listing::{ListingEntry, parse_listing};
pub use proc_status::{ProcCapabilities, parse_proc_status};
pub use status::{StatusRecord, parse_status};

/// Pid reported by the init system for a task without a running process.
pub const NOT_RUNNING_PID: i64 = -1;

/// Maximum number of characters of offending input kept in an error.
const MAX_EXCERPT_LEN: usize = 200;

/// Errors produced when response text does not match its grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No line of a status response carried a `status: <word>, pid: <n>`
    /// pair.
    #[error("no 'status: <word>, pid: <integer>' pair in status response: {input:?}")]
    StatusLine {
        /// Excerpt of the offending response.
        input: String,
    },

    /// A listing row could not be split into name and pid.
    #[error("malformed listing line {line_no}: {reason}: {line:?}")]
    ListingLine {
        /// 1-based line number within the response.
        line_no: usize,
        /// The offending line.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A pid did not fit the integer range.
    #[error("pid {value:?} is not a valid integer")]
    InvalidPid {
        /// The offending text.
        value: String,
    },

    /// A required field is missing from `/proc/<pid>/status`.
    #[error("field '{field}' missing from process status")]
    MissingField {
        /// The field label.
        field: &'static str,
    },

    /// A capability field is not a hexadecimal mask.
    #[error("field '{field}' has non-hexadecimal value {value:?}")]
    InvalidMask {
        /// The field label.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT_LEN {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_EXCERPT_LEN).collect();
        cut.push_str("...");
        cut
    }
}

fn parse_pid(value: &str) -> Result<i64, ParseError> {
    value.parse::<i64>().map_err(|_| ParseError::InvalidPid {
        value: value.to_string(),
    })
}
