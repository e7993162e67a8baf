//! Capability fields of the kernel's `/proc/<pid>/status` text.
//!
//! The text is line oriented, `Label:\tvalue`. The capability sets are
//! fixed-width hexadecimal strings:
//!
//! ```text
//! CapInh:	0000000000000000
//! CapPrm:	0000000002001000
//! CapEff:	0000000002001000
//! CapBnd:	000001ffffffffff
//! CapAmb:	0000000000000000
//! ```

use serde::Serialize;

use crate::capability::CapabilitySet;

use super::ParseError;

/// Capability sets of a process as exposed by the kernel.
///
/// Only the effective set is required; the others are absent on kernels that
/// predate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcCapabilities {
    /// `CapEff`.
    pub effective: CapabilitySet,
    /// `CapPrm`.
    pub permitted: Option<CapabilitySet>,
    /// `CapInh`.
    pub inheritable: Option<CapabilitySet>,
    /// `CapBnd`.
    pub bounding: Option<CapabilitySet>,
    /// `CapAmb`.
    pub ambient: Option<CapabilitySet>,
}

/// Parses the capability fields out of `/proc/<pid>/status` text.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] if there is no `CapEff` line and
/// [`ParseError::InvalidMask`] if any capability field is not hexadecimal.
pub fn parse_proc_status(text: &str) -> Result<ProcCapabilities, ParseError> {
    Ok(ProcCapabilities {
        effective: field(text, "CapEff")?.ok_or(ParseError::MissingField { field: "CapEff" })?,
        permitted: field(text, "CapPrm")?,
        inheritable: field(text, "CapInh")?,
        bounding: field(text, "CapBnd")?,
        ambient: field(text, "CapAmb")?,
    })
}

fn field(text: &str, label: &'static str) -> Result<Option<CapabilitySet>, ParseError> {
    let Some(value) = text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == label).then(|| value.trim())
    }) else {
        return Ok(None);
    };

    let invalid = || ParseError::InvalidMask {
        field: label,
        value: value.to_string(),
    };
    if value.is_empty() || value.len() > 32 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u128::from_str_radix(value, 16)
        .map(|bits| Some(CapabilitySet::from_bits(bits)))
        .map_err(|_| invalid())
}
