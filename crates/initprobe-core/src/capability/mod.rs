//! Linux capability verification.
//!
//! Verifying a task's capabilities takes three independent steps:
//!
//! 1. [`CapabilityResolver`] maps the configured names to bit positions using
//!    a [`CapabilityTable`] and assembles the expected mask.
//! 2. [`ProcessCapabilityInspector`] reads the effective mask of the task's
//!    process from the kernel.
//! 3. [`CapabilityVerifier`] requires the two masks to be bitwise equal.
//!
//! The name-to-bit mapping is kernel dependent, so it is looked up in a table
//! taken from the host ([`HeaderCapabilityTable`]) whenever one is available.
//! [`StaticCapabilityTable`] is the bundled fallback.

mod inspector;
mod resolver;
mod table;
mod verifier;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::Serialize;

pub use inspector::{LocalProcStatus, ProcStatusSource, ProcessCapabilityInspector, RemoteProcStatus};
pub use resolver::CapabilityResolver;
pub use table::{
    CapabilityTable, DEFAULT_HEADER_PATH, HeaderCapabilityTable, StaticCapabilityTable,
};
pub use verifier::CapabilityVerifier;

/// Number of bits a [`CapabilitySet`] can hold.
pub const MAX_CAPABILITY_BITS: u32 = u128::BITS;

/// A capability bitmask.
///
/// The kernel exposes 64-bit masks today. The set is 128 bits wide so that a
/// capability resolved from a newer table than the running kernel knows is
/// still representable; it then simply mismatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u128);

impl CapabilitySet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Creates a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u128 {
        self.0
    }

    /// Set containing only `bit`, or `None` if `bit` does not fit.
    #[must_use]
    pub const fn single(bit: u32) -> Option<Self> {
        if bit < MAX_CAPABILITY_BITS {
            Some(Self(1u128 << bit))
        } else {
            None
        }
    }

    /// Returns `true` if `bit` is set.
    #[must_use]
    pub const fn contains(self, bit: u32) -> bool {
        bit < MAX_CAPABILITY_BITS && self.0 & (1u128 << bit) != 0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the set bit positions, lowest first.
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..MAX_CAPABILITY_BITS).filter(move |&bit| self.contains(bit))
    }
}

impl From<u64> for CapabilitySet {
    fn from(bits: u64) -> Self {
        Self(u128::from(bits))
    }
}

impl BitOr for CapabilitySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CapabilitySet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Formats as `0x` followed by at least 16 hex digits, the width of a kernel
/// capability field.
impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
