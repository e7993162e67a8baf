//! Capability name resolution.

use tracing::debug;

use super::{CapabilitySet, CapabilityTable};
use crate::HarnessError;

/// Resolves capability names to bits and assembles expected masks.
pub struct CapabilityResolver {
    table: Box<dyn CapabilityTable>,
}

impl std::fmt::Debug for CapabilityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityResolver")
            .field("table", &self.table.describe())
            .finish()
    }
}

impl CapabilityResolver {
    /// Creates a resolver backed by `table`.
    #[must_use]
    pub fn new(table: impl CapabilityTable + 'static) -> Self {
        Self {
            table: Box::new(table),
        }
    }

    /// Resolves one name to its bit position.
    ///
    /// Matching is case-insensitive and the `CAP_` prefix is optional, so
    /// `cap_net_admin`, `NET_ADMIN` and `CAP_NET_ADMIN` are the same
    /// capability. A plain decimal number resolves to itself.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::UnknownCapability`] if the table has no such
    /// name.
    pub fn resolve(&self, name: &str) -> Result<u32, HarnessError> {
        let trimmed = name.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(bit) = trimmed.parse() {
                return Ok(bit);
            }
        }

        let upper = trimmed.to_ascii_uppercase();
        let canonical = if upper.starts_with("CAP_") {
            upper
        } else {
            format!("CAP_{upper}")
        };

        self.table
            .lookup(&canonical)
            .ok_or_else(|| HarnessError::UnknownCapability {
                name: name.to_string(),
                table: self.table.describe(),
            })
    }

    /// ORs together the bit of every name.
    ///
    /// Duplicates change nothing and an empty list yields the empty set.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::UnknownCapability`] for the first name that
    /// does not resolve and [`HarnessError::CapabilityOutOfRange`] for one
    /// whose bit no mask can hold.
    pub fn assemble<S: AsRef<str>>(&self, names: &[S]) -> Result<CapabilitySet, HarnessError> {
        let mut mask = CapabilitySet::EMPTY;
        for name in names {
            let name = name.as_ref();
            let bit = self.resolve(name)?;
            mask |= CapabilitySet::single(bit).ok_or_else(|| HarnessError::CapabilityOutOfRange {
                name: name.to_string(),
                bit,
            })?;
        }
        debug!(count = names.len(), %mask, "assembled capability mask");
        Ok(mask)
    }
}
