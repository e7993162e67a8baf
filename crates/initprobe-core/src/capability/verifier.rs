//! Exact comparison of expected and observed capability sets.

use tracing::{debug, info};

use super::{CapabilityResolver, CapabilitySet, ProcStatusSource, ProcessCapabilityInspector};
use crate::HarnessError;
use crate::task::TaskStateModel;

/// Checks that a process holds exactly a configured set of capabilities.
#[derive(Debug)]
pub struct CapabilityVerifier<S> {
    resolver: CapabilityResolver,
    inspector: ProcessCapabilityInspector<S>,
}

impl<S: ProcStatusSource> CapabilityVerifier<S> {
    /// Creates a verifier from its two producers.
    #[must_use]
    pub const fn new(resolver: CapabilityResolver, inspector: ProcessCapabilityInspector<S>) -> Self {
        Self {
            resolver,
            inspector,
        }
    }

    /// Requires the effective set of `pid` to equal the set named by
    /// `expected`, bit for bit. A superset is as much a failure as a subset.
    ///
    /// Returns the matched set.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::UnknownCapability`] if a name does not resolve
    /// - [`HarnessError::ProcessNotFound`] if the process has exited
    /// - [`HarnessError::CapabilityMismatch`] with both masks if they differ
    pub fn verify<N: AsRef<str>>(&self, expected: &[N], pid: i64) -> Result<CapabilitySet, HarnessError> {
        let expected = self.resolver.assemble(expected)?;
        let observed = self.inspector.effective_capabilities(pid)?;
        if expected != observed {
            debug!(pid, %expected, %observed, "capability mismatch");
            return Err(HarnessError::CapabilityMismatch {
                pid,
                expected,
                observed,
            });
        }
        info!(pid, capabilities = %observed, "capabilities verified");
        Ok(observed)
    }

    /// Like [`Self::verify`], for the process currently running `task`.
    ///
    /// # Errors
    ///
    /// As [`Self::verify`]; a task with no running process is
    /// [`HarnessError::ProcessNotFound`] with the sentinel pid.
    pub fn verify_task<N: AsRef<str>>(
        &self,
        expected: &[N],
        model: &TaskStateModel<'_>,
        task: &str,
    ) -> Result<CapabilitySet, HarnessError> {
        let observed = model.query_state(task)?;
        if !observed.has_pid() {
            return Err(HarnessError::ProcessNotFound { pid: observed.pid });
        }
        self.verify(expected, observed.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{LocalProcStatus, StaticCapabilityTable};

    fn verifier(pid: i64, cap_eff: &str) -> (tempfile::TempDir, CapabilityVerifier<LocalProcStatus>) {
        let dir = tempfile::tempdir().unwrap();
        let pid_dir = dir.path().join(pid.to_string());
        std::fs::create_dir(&pid_dir).unwrap();
        std::fs::write(pid_dir.join("status"), format!("Name:\tt\nCapEff:\t{cap_eff}\n")).unwrap();

        let verifier = CapabilityVerifier::new(
            CapabilityResolver::new(StaticCapabilityTable),
            ProcessCapabilityInspector::new(LocalProcStatus::with_root(dir.path())),
        );
        (dir, verifier)
    }

    #[test]
    fn test_exact_match() {
        let (_dir, verifier) = verifier(10, "0000000002001000");
        let matched = verifier.verify(&["CAP_NET_ADMIN", "CAP_SYS_TIME"], 10).unwrap();
        assert_eq!(matched.bits(), 0x200_1000);
    }

    #[test]
    fn test_subset_is_mismatch() {
        let (_dir, verifier) = verifier(10, "0000000000001000");
        let err = verifier.verify(&["CAP_NET_ADMIN", "CAP_SYS_TIME"], 10).unwrap_err();
        assert!(err.is_mismatch());

        let message = err.to_string();
        assert!(message.contains("0x0000000002001000"), "{message}");
        assert!(message.contains("0x0000000000001000"), "{message}");
    }

    #[test]
    fn test_superset_is_mismatch() {
        let (_dir, verifier) = verifier(10, "0000000002001001");
        let err = verifier.verify(&["CAP_NET_ADMIN", "CAP_SYS_TIME"], 10).unwrap_err();
        match err {
            HarnessError::CapabilityMismatch {
                pid,
                expected,
                observed,
            } => {
                assert_eq!(pid, 10);
                assert_eq!(expected.bits(), 0x200_1000);
                assert_eq!(observed.bits(), 0x200_1001);
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_expectation_matches_no_capabilities() {
        let (_dir, verifier) = verifier(10, "0000000000000000");
        let names: [&str; 0] = [];
        assert!(verifier.verify(&names, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_name_is_not_a_mismatch() {
        let (_dir, verifier) = verifier(10, "0000000000000000");
        let err = verifier.verify(&["CAP_FLY"], 10).unwrap_err();
        assert!(!err.is_mismatch());
        assert!(matches!(err, HarnessError::UnknownCapability { .. }));
    }

    #[test]
    fn test_vanished_process_is_not_a_mismatch() {
        let (_dir, verifier) = verifier(10, "0000000000000000");
        let err = verifier.verify(&["CAP_CHOWN"], 11).unwrap_err();
        assert!(matches!(err, HarnessError::ProcessNotFound { pid: 11 }));
    }

    #[test]
    fn test_bit_beyond_kernel_width_mismatches() {
        let (_dir, verifier) = verifier(10, "ffffffffffffffff");
        let err = verifier.verify(&["64"], 10).unwrap_err();
        assert!(err.is_mismatch());
    }
}
