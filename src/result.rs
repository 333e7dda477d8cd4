//! C5: result model.
//!
//! Pure value types describing the outcome of one `Sandbox::run`. No I/O;
//! field names and semantics follow `original_source/result.go` with units
//! made explicit per `spec.md` §3.

use std::fmt::{self, Display, Formatter};

use crate::memory_size::MemorySize;

/// Derived classification of a `RunResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The judgee ran to completion with no signal and no runtime error.
    Success,

    /// The judgee was terminated by or stopped on a signal attributable to
    /// the run (CPU TLE, wall-clock TLE, MLE, banned syscall, crash).
    SignalError,

    /// The judgee failed to start or exited abnormally without being
    /// terminated by a signal the supervisor observed (e.g. a non-zero
    /// exit from a failed `execve`).
    RuntimeError,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::SignalError => "Signal Error",
            Status::RuntimeError => "Runtime Error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of one supervised run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunResult {
    /// CPU time consumed, user + sys, in milliseconds.
    pub cpu_time_ms: u64,

    /// Wall-clock time elapsed, in milliseconds.
    pub real_time_ms: u64,

    /// Peak sampled memory usage, in kilobytes.
    pub memory_kb: u64,

    /// Terminating or last-observed-stop signal number; `None` if the
    /// judgee exited cleanly. `original_source/result.go` uses a bare `int`
    /// with `0` meaning "none"; this crate prefers `Option<i32>`.
    pub signal: Option<i32>,

    /// Set when the child stopped under ptrace for a reason other than a
    /// syscall-stop (a real signal: SIGSEGV, SIGXCPU, SIGXFSZ, a
    /// seccomp-kill SIGSYS, ...).
    pub re_flag: bool,

    /// Set when the judgee failed to start or otherwise failed in a way
    /// attributable to the submission rather than the sandbox.
    pub runtime_error: bool,

    /// Human-readable detail when `runtime_error` is set; empty otherwise.
    pub runtime_error_message: String,
}

impl RunResult {
    /// A result with every field at its zero value: no time used, no
    /// signal, no error. Callers fill this in as the run progresses.
    pub fn new() -> RunResult {
        RunResult {
            cpu_time_ms: 0,
            real_time_ms: 0,
            memory_kb: 0,
            signal: None,
            re_flag: false,
            runtime_error: false,
            runtime_error_message: String::new(),
        }
    }

    /// Record a runtime error with the given message. Does not touch
    /// `signal` or `re_flag`; a runtime error and a signal are reported
    /// independently per `spec.md`'s `Status` derivation.
    pub fn set_runtime_error<S: Into<String>>(&mut self, message: S) {
        self.runtime_error = true;
        self.runtime_error_message = message.into();
    }

    /// Whether the run succeeded: no runtime error and no signal observed.
    pub fn is_success(&self) -> bool {
        !self.runtime_error && self.signal.is_none()
    }

    /// Peak memory usage as a `MemorySize`.
    pub fn memory_used(&self) -> MemorySize {
        MemorySize::KiloBytes(self.memory_kb)
    }

    /// Derived `Status`, following `spec.md` §3: runtime error takes
    /// precedence over a bare signal, which in turn takes precedence over
    /// success.
    pub fn status(&self) -> Status {
        if self.runtime_error {
            Status::RuntimeError
        } else if self.signal.is_some() {
            Status::SignalError
        } else {
            Status::Success
        }
    }
}

impl Default for RunResult {
    fn default() -> RunResult {
        RunResult::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_result_is_success() {
        let result = RunResult::new();
        assert!(result.is_success());
        assert_eq!(result.status(), Status::Success);
    }

    #[test]
    fn test_signal_without_runtime_error_is_signal_error() {
        let mut result = RunResult::new();
        result.signal = Some(9);
        assert!(!result.is_success());
        assert_eq!(result.status(), Status::SignalError);
    }

    #[test]
    fn test_runtime_error_takes_precedence_over_signal() {
        let mut result = RunResult::new();
        result.signal = Some(9);
        result.set_runtime_error("execve failed: ENOENT");
        assert_eq!(result.status(), Status::RuntimeError);
        assert_eq!(result.runtime_error_message, "execve failed: ENOENT");
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(Status::Success.as_str(), "Success");
        assert_eq!(Status::SignalError.as_str(), "Signal Error");
        assert_eq!(Status::RuntimeError.as_str(), "Runtime Error");
    }
}
