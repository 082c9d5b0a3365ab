// src/exit.rs
//! Standardized process exit codes for `ctupipe`.
//!
//! Provides a stable contract for scripts and automation.

use std::process::Termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CtupipeExit {
    /// Every dispatched translation unit was analyzed successfully.
    Success = 0,
    /// Generic error (e.g. IO, config, worker pool construction).
    Error = 1,
    /// Input validation failed (unreadable action list, bad config).
    InvalidInput = 2,
    /// The run completed but at least one translation unit failed.
    AnalysisFailed = 3,
    /// The run was aborted by SIGINT/SIGTERM.
    Interrupted = 130,
}

impl CtupipeExit {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl Termination for CtupipeExit {
    fn report(self) -> std::process::ExitCode {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        std::process::ExitCode::from(self.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_uses_shell_convention() {
        assert_eq!(CtupipeExit::Interrupted.code(), 130);
    }
}
