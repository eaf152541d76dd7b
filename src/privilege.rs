//! Elevation check for the running process
//!
//! The check runs once per probe and is cached; elevation cannot change during
//! a run.

use std::sync::OnceLock;
use taskflow::PrivilegeProbe;

/// Probe backed by the operating system
#[derive(Debug, Default)]
pub struct ProcessPrivilege {
    elevated: OnceLock<bool>,
}

impl ProcessPrivilege {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivilegeProbe for ProcessPrivilege {
    fn is_elevated(&self) -> bool {
        *self.elevated.get_or_init(|| {
            let elevated = detect();
            log::debug!("Process elevated: {elevated}");
            elevated
        })
    }
}

#[cfg(unix)]
fn detect() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(windows)]
fn detect() -> bool {
    // `net session` is refused for non-administrators
    crate::runner::run_quiet("net", &["session"])
}

#[cfg(not(any(unix, windows)))]
fn detect() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_matches_effective_uid() {
        let probe = ProcessPrivilege::new();
        // SAFETY: see detect()
        let root = unsafe { libc::geteuid() } == 0;
        assert_eq!(probe.is_elevated(), root);
        // Cached answer is stable
        assert_eq!(probe.is_elevated(), root);
    }
}
