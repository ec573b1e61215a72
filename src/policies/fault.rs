//! # What happens to a browser after a failed render.
//!
//! ```text
//! outcome                      AlwaysRestart   RecycleInPlace
//! success                      keep            keep
//! skipped (never touched)      keep            keep
//! content / timeout failure    restart         keep (after cleanup)
//! UnhandledEngineFault         restart         restart
//! cleanup failed               restart         restart
//! ```

use crate::error::ErrorKind;

/// Fault policy applied when a render session ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Any failure that touched the browser restarts the process (default).
    #[default]
    AlwaysRestart,
    /// Only engine faults and failed cleanups restart the process.
    RecycleInPlace,
}

impl FaultPolicy {
    /// Decides whether the slot's browser must be replaced.
    ///
    /// - `failure`: kind of the failed render, `None` on success
    /// - `touched`: whether the session ever sent a command to the browser
    /// - `cleanup_ok`: whether post-render cleanup succeeded
    pub fn requires_restart(
        &self,
        failure: Option<ErrorKind>,
        touched: bool,
        cleanup_ok: bool,
    ) -> bool {
        if !touched {
            return false;
        }
        if !cleanup_ok {
            return true;
        }
        match (self, failure) {
            (_, None) => false,
            (FaultPolicy::AlwaysRestart, Some(_)) => true,
            (FaultPolicy::RecycleInPlace, Some(kind)) => kind == ErrorKind::UnhandledEngineFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_sessions_never_restart() {
        for policy in [FaultPolicy::AlwaysRestart, FaultPolicy::RecycleInPlace] {
            assert!(!policy.requires_restart(Some(ErrorKind::ClientDropped), false, true));
        }
    }

    #[test]
    fn always_restart_replaces_after_any_failure() {
        let p = FaultPolicy::AlwaysRestart;
        assert!(p.requires_restart(Some(ErrorKind::ElementWaitFailure), true, true));
        assert!(!p.requires_restart(None, true, true));
    }

    #[test]
    fn recycle_in_place_keeps_content_faults() {
        let p = FaultPolicy::RecycleInPlace;
        assert!(!p.requires_restart(Some(ErrorKind::Timeout), true, true));
        assert!(p.requires_restart(Some(ErrorKind::UnhandledEngineFault), true, true));
        assert!(p.requires_restart(None, true, false));
    }
}
