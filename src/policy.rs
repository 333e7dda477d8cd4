//! Credential and syscall policy applied to the judgee before `execve`.

/// The action seccomp takes when a denied syscall is invoked. `spec.md`'s
/// default is `Errno` (the judged program observes a deterministic error
/// rather than disappearing); `KillProcess` is offered for callers that want
/// the stricter posture the teacher crate's own seccomp module defaults to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeccompDenyAction {
    /// The denied syscall fails with `EPERM`.
    Errno,

    /// The process is killed immediately, as though by a `SIGSYS` delivery.
    KillProcess,
}

impl Default for SeccompDenyAction {
    fn default() -> SeccompDenyAction {
        SeccompDenyAction::Errno
    }
}

/// Security policy applied to the judgee: credentials to drop to, an
/// optional chroot, and the syscall allow/deny vector.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityPolicy {
    /// Target uid. `0` means "keep current".
    pub uid: u32,

    /// Target gid. `0` means "keep current".
    pub gid: u32,

    /// Optional chroot directory.
    pub chroot_dir: Option<std::path::PathBuf>,

    /// Syscall policy vector: position `i` is `true` iff syscall `i` is
    /// permitted. `None` means "allow all" (no seccomp filter is installed).
    pub syscall_policy: Option<Vec<bool>>,

    /// Action taken for a denied syscall.
    pub deny_action: SeccompDenyAction,
}

impl SecurityPolicy {
    /// Create a policy with no credential change, no chroot and no syscall
    /// restriction.
    pub fn permissive() -> SecurityPolicy {
        SecurityPolicy::default()
    }

    /// Whether this policy requires a seccomp filter to be installed.
    pub fn needs_seccomp(&self) -> bool {
        self.syscall_policy.is_some()
    }

    /// Whether this policy requires a credential change.
    pub fn needs_credential_drop(&self) -> bool {
        self.uid != 0 || self.gid != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissive_policy_needs_nothing() {
        let policy = SecurityPolicy::permissive();
        assert!(!policy.needs_seccomp());
        assert!(!policy.needs_credential_drop());
    }

    #[test]
    fn test_policy_with_syscall_vector_needs_seccomp() {
        let policy = SecurityPolicy {
            syscall_policy: Some(vec![true; 400]),
            ..SecurityPolicy::default()
        };
        assert!(policy.needs_seccomp());
    }
}
