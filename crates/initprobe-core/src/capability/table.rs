//! Capability name tables.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::HarnessError;
use crate::gateway::CommandGateway;

/// Default location of the kernel UAPI capability header.
pub const DEFAULT_HEADER_PATH: &str = "/usr/include/linux/capability.h";

/// Maps capability names to bit positions.
pub trait CapabilityTable {
    /// Bit position of `name`, which is already normalized to the canonical
    /// upper-case `CAP_*` form.
    fn lookup(&self, name: &str) -> Option<u32>;

    /// Short description of where the table came from, for error messages.
    fn describe(&self) -> String;
}

// ============================================================================
// Header table
// ============================================================================

/// `#define CAP_<NAME> <decimal>`. Function-like macros and derived
/// constants have a non-numeric value and never match.
static DEFINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*#[ \t]*define[ \t]+(CAP_[A-Z0-9_]+)[ \t]+(\d+)[ \t]*(?:/\*.*)?$")
        .expect("capability define regex is valid")
});

/// Constants in the header that are not capabilities.
const PSEUDO_CONSTANTS: &[&str] = &["CAP_LAST_CAP"];

/// A table parsed from the kernel's `linux/capability.h`.
#[derive(Debug, Clone)]
pub struct HeaderCapabilityTable {
    entries: BTreeMap<String, u32>,
    source: String,
}

impl HeaderCapabilityTable {
    /// Parses header text. `source` describes where the text came from.
    #[must_use]
    pub fn parse(text: &str, source: impl Into<String>) -> Self {
        let entries = DEFINE_RE
            .captures_iter(text)
            .filter(|caps| !PSEUDO_CONSTANTS.contains(&&caps[1]))
            .filter_map(|caps| Some((caps[1].to_string(), caps[2].parse().ok()?)))
            .collect();
        Self {
            entries,
            source: source.into(),
        }
    }

    /// Loads the header from the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::LocalRead`] if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| HarnessError::local_read(path, e))?;
        Ok(Self::parse(&text, path.display().to_string()))
    }

    /// Fetches the header from the target, so the mapping matches the
    /// target's kernel rather than the harness host's.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailure`] if the header cannot be read
    /// on the target, and transport errors unchanged.
    pub fn fetch(gateway: &CommandGateway<'_>, path: &Path) -> Result<Self, HarnessError> {
        let action = format!("cat {}", path.display());
        let result = gateway
            .exec(&format!("cat {}", crate::transport::quote::quote_path(path)))?
            .require_success(action)?;
        Ok(Self::parse(
            &result.stdout,
            format!("{} on {}", path.display(), gateway.describe()),
        ))
    }

    /// Number of capabilities in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the header defined no capabilities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CapabilityTable for HeaderCapabilityTable {
    fn lookup(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    fn describe(&self) -> String {
        format!("header {}", self.source)
    }
}

// ============================================================================
// Static table
// ============================================================================

const STATIC_NAMES: [&str; 41] = [
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

/// The bundled table of capabilities 0 through 40.
///
/// Used when no header is available on the host or the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCapabilityTable;

impl CapabilityTable for StaticCapabilityTable {
    fn lookup(&self, name: &str) -> Option<u32> {
        STATIC_NAMES
            .iter()
            .position(|&entry| entry == name)
            .and_then(|idx| u32::try_from(idx).ok())
    }

    fn describe(&self) -> String {
        "bundled static table".to_string()
    }
}
