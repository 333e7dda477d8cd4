//! C2: seccomp filter.
//!
//! Compiles a `SecurityPolicy`'s syscall-policy vector into a seccomp-BPF
//! filter and loads it into the calling task. Ported from the teacher's
//! `seccomp_sys`-based module, generalized from a fixed blacklist-of-banned-
//! syscalls to an arbitrary allow/deny vector, and switched from a
//! kill-by-default context to an allow-by-default one so that a `None`
//! syscall policy needs no seccomp filter at all. `spec.md` §4.2.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

use seccomp_sys::*;

use crate::policy::SeccompDenyAction;

/// The error type produced by the `libseccomp` FFI layer.
#[derive(Clone, Copy, Debug)]
pub struct SeccompError {
    errno: i32,
}

impl SeccompError {
    fn new(errno: i32) -> Self {
        SeccompError { errno }
    }
}

impl Display for SeccompError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "seccomp error: {}", self.errno)
    }
}

impl StdError for SeccompError {}

pub type Result<T> = std::result::Result<T, SeccompError>;

/// Set `PR_SET_NO_NEW_PRIVS`. Required unconditionally before a seccomp
/// filter can be loaded without `CAP_SYS_ADMIN`, and doubles as a guard
/// against the judgee regaining privilege through a setuid binary.
pub(crate) fn set_no_new_privs() -> Result<()> {
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret == 0 {
        Ok(())
    } else {
        Err(SeccompError::new(ret))
    }
}

/// Build and load a seccomp-BPF filter from `policy`: default action is
/// allow, and every syscall number whose slot in `policy` is `false` gets a
/// rule for `deny_action`. Targets the architecture native to this build:
/// `seccomp_init` always seeds the filter with `SCMP_ARCH_NATIVE`, so
/// foreign-ABI syscalls (e.g. 32-bit syscalls on an x86_64 host) are
/// rejected implicitly rather than individually enumerated.
pub(crate) fn load_filter(policy: &[bool], deny_action: SeccompDenyAction) -> Result<()> {
    let ctx = unsafe { seccomp_init(SCMP_ACT_ALLOW) };
    if ctx.is_null() {
        return Err(SeccompError::new(-1));
    }

    let native_deny_action = match deny_action {
        SeccompDenyAction::Errno => SCMP_ACT_ERRNO(libc::EPERM as u32),
        SeccompDenyAction::KillProcess => SCMP_ACT_KILL_PROCESS,
    };

    for (syscall, &allowed) in policy.iter().enumerate() {
        if allowed {
            continue;
        }
        let ret = unsafe {
            seccomp_rule_add_array(
                ctx,
                native_deny_action,
                syscall as i32,
                0,
                std::ptr::null(),
            )
        };
        if ret < 0 {
            unsafe { seccomp_release(ctx) };
            return Err(SeccompError::new(ret));
        }
    }

    let ret = unsafe { seccomp_load(ctx) };
    unsafe { seccomp_release(ctx) };
    if ret < 0 {
        return Err(SeccompError::new(ret));
    }

    Ok(())
}
