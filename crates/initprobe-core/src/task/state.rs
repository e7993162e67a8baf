//! Task state values.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::parser::{NOT_RUNNING_PID, StatusRecord};

// Status bits as crinit reports them numerically.
const STATUS_STARTING: u64 = 1 << 0;
const STATUS_RUNNING: u64 = 1 << 1;
const STATUS_DONE: u64 = 1 << 2;
const STATUS_FAILED: u64 = 1 << 3;

/// Lifecycle state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The instance does not know the task.
    Unknown,
    /// The task's process is running.
    Running,
    /// The task finished successfully.
    Done,
    /// The task failed.
    Failed,
    /// The task is loaded but not running and has not finished.
    Stopped,
    /// A state word outside the known set, kept verbatim (lower-cased).
    Other(String),
}

impl TaskState {
    /// Interprets a status word.
    ///
    /// Known words match exactly (ignoring case); `failedover` is not
    /// `failed`. A numeric word is decoded as crinit's status bitmask, where
    /// the failure bit wins over done and done over running.
    #[must_use]
    pub fn from_word(word: &str) -> Self {
        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "unknown" => Self::Unknown,
            "running" => Self::Running,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            _ => lower.parse::<u64>().map_or(Self::Other(lower), Self::from_bits),
        }
    }

    fn from_bits(bits: u64) -> Self {
        if bits & STATUS_FAILED != 0 {
            Self::Failed
        } else if bits & STATUS_DONE != 0 {
            Self::Done
        } else if bits & STATUS_RUNNING != 0 {
            Self::Running
        } else if bits & STATUS_STARTING != 0 {
            Self::Other("starting".to_string())
        } else {
            Self::Stopped
        }
    }

    /// Returns `true` for `done` and `failed`, the states a task can be
    /// restarted from.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state word.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Other(word) => word,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_word(s))
    }
}

/// One observation of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Task name, unique within an instance.
    pub name: String,
    /// Process id, `-1` when there is none.
    pub pid: i64,
    /// Observed state.
    pub state: TaskState,
}

impl Task {
    /// Builds a task from a parsed status response.
    #[must_use]
    pub fn from_status(name: &str, record: &StatusRecord) -> Self {
        Self {
            name: name.to_string(),
            pid: record.pid,
            state: TaskState::from_word(&record.state),
        }
    }

    /// A task the instance does not know.
    #[must_use]
    pub fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pid: NOT_RUNNING_PID,
            state: TaskState::Unknown,
        }
    }

    /// Returns `true` if a process id is known.
    #[must_use]
    pub const fn has_pid(&self) -> bool {
        self.pid != NOT_RUNNING_PID
    }
}
