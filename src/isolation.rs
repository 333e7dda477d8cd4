//! C1: limits and isolation.
//!
//! Turns a `Limits` + `SecurityPolicy` into kernel state on the calling
//! task. Every function here runs on the child's task between `fork` and
//! `execve` and is meant to be driven, in order, by `cgroup::enter` →
//! `apply_rlimits` → `unshare_namespaces` → `apply_chroot` →
//! `drop_credentials`, exactly the order `spec.md` §4.1 mandates: cgroup
//! attach happens before namespace entry so the pid is still resolvable
//! from the parent's view, and credentials are dropped last so every prior
//! step still runs with the privilege it needs.
//!
//! Grounded in `original_source/limit.go` (`createCgroup`, `addToCgroup`,
//! `enterNamespace`, `setProcUser`) and the teacher's `sandbox/src/rlimits.rs`
//! binding style.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chroot, setgid, setuid, Gid, Uid};

use crate::error::{ErrorKind, Result, ResultExt};
use crate::limits::Limits;
use crate::policy::SecurityPolicy;
use crate::rlimits::{setrlimit_hard, Resource};

/// Create the cgroup v2 node at `cgroup_dir` and write the limits that map
/// onto cgroup controllers (`cpu.max`, `memory.max`). Does not attach any
/// process; call `attach` once the node exists.
pub(crate) fn create_cgroup(cgroup_dir: &Path, limits: &Limits) -> Result<()> {
    fs::create_dir_all(cgroup_dir).chain_err(|| {
        ErrorKind::CgroupSetup(cgroup_dir.to_path_buf(), "mkdir failed".to_owned())
    })?;

    if limits.has_cpu_time_limit() {
        let cpu_us = limits.cpu_time_ms * 1000;
        write_cgroup_file(cgroup_dir, "cpu.max", &format!("{} 100000", cpu_us))?;
    }

    if limits.has_memory_limit() {
        let bytes = limits.memory_kb * 1024;
        write_cgroup_file(cgroup_dir, "memory.max", &bytes.to_string())?;
    }

    Ok(())
}

/// Attach the calling task to the cgroup node by writing its pid to
/// `cgroup.procs`. All descendants the task later forks inherit membership.
pub(crate) fn attach_cgroup(cgroup_dir: &Path, pid: i32) -> Result<()> {
    write_cgroup_file(cgroup_dir, "cgroup.procs", &pid.to_string())
}

/// Remove the cgroup node. Safe to call on a node that no longer exists:
/// teardown runs on every exit path and the node may already be gone if an
/// earlier step failed.
pub(crate) fn remove_cgroup(cgroup_dir: &Path) -> Result<()> {
    match fs::remove_dir(cgroup_dir) {
        Ok(()) => Ok(()),
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).chain_err(|| {
            ErrorKind::CgroupSetup(cgroup_dir.to_path_buf(), "rmdir failed".to_owned())
        }),
    }
}

fn write_cgroup_file(cgroup_dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = cgroup_dir.join(name);
    fs::write(&path, contents).chain_err(|| {
        ErrorKind::CgroupSetup(path.clone(), format!("failed to write {}", name))
    })
}

/// Apply the rlimits expressible outside the cgroup: stack size, output
/// file size, and a CPU time backstop. `spec.md` §4.1 step 3: "RLIMIT_CPU
/// may additionally back-stop the cgroup CPU cap." The cgroup `cpu.max`
/// file caps a *rate*, not a total, and a sub-period budget may never
/// throttle a single-threaded loop at all, so `RLIMIT_CPU` is the only
/// mechanism that actually raises SIGXCPU per `spec.md` §4.4.
pub(crate) fn apply_rlimits(limits: &Limits) -> Result<()> {
    if limits.has_stack_limit() {
        setrlimit_hard(Resource::Stack, limits.stack_kb * 1024)?;
    }
    if limits.has_output_size_limit() {
        setrlimit_hard(Resource::FileSize, limits.output_size_bytes)?;
    }
    if limits.has_cpu_time_limit() {
        let cpu_seconds = (limits.cpu_time_ms + 999) / 1000;
        setrlimit_hard(Resource::CpuTime, cpu_seconds.max(1))?;
    }
    Ok(())
}

/// Unshare the PID, network and mount namespaces. Network isolation is
/// mandatory per `spec.md` §4.1 step 4: the judgee must not be able to
/// reach host services.
pub(crate) fn unshare_namespaces() -> Result<()> {
    unshare(CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWNS)
        .chain_err(|| ErrorKind::NamespaceSetup("unshare failed".to_owned()))
}

/// Chroot into `dir` if the policy configures one. A no-op when
/// `chroot_dir` is `None`.
pub(crate) fn apply_chroot(dir: Option<&PathBuf>) -> Result<()> {
    if let Some(dir) = dir {
        chroot(dir.as_path()).chain_err(|| ErrorKind::ChrootFailed(dir.clone()))?;
    }
    Ok(())
}

/// Drop credentials to the policy's configured uid/gid. Order matters: gid
/// must be dropped before uid, because once the effective uid is no longer
/// 0 the task loses the privilege to change its gid. `original_source`'s
/// `setProcUser` gets this backwards (uid first); `spec.md` §4.1 step 6
/// corrects it.
pub(crate) fn drop_credentials(policy: &SecurityPolicy) -> Result<()> {
    if policy.gid != 0 {
        setgid(Gid::from_raw(policy.gid))?;
    }
    if policy.uid != 0 {
        setuid(Uid::from_raw(policy.uid))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SecurityPolicy;

    #[test]
    fn test_apply_chroot_is_noop_without_configured_dir() {
        assert!(apply_chroot(None).is_ok());
    }

    #[test]
    fn test_drop_credentials_is_noop_for_permissive_policy() {
        let policy = SecurityPolicy::permissive();
        assert!(drop_credentials(&policy).is_ok());
    }

    #[test]
    fn test_apply_rlimits_is_noop_for_unset_limits() {
        assert!(apply_rlimits(&Limits::unset()).is_ok());
    }

    #[test]
    fn test_create_and_remove_cgroup_roundtrip_on_plain_directory() {
        // This does not touch the real cgroup v2 hierarchy; it only verifies
        // the create/write/remove bookkeeping against an ordinary directory.
        let dir = tempfile::tempdir().unwrap();
        let cgroup_dir = dir.path().join("sandbox-test-cgroup");
        let limits = Limits {
            cpu_time_ms: 1000,
            memory_kb: 65536,
            ..Limits::unset()
        };
        create_cgroup(&cgroup_dir, &limits).unwrap();
        assert!(cgroup_dir.join("cpu.max").is_file());
        assert!(cgroup_dir.join("memory.max").is_file());

        // On a real cgroup v2 hierarchy `cpu.max`/`memory.max` are kernel
        // pseudo-files that vanish with the node itself; a plain directory
        // needs its regular files cleared first to exercise the same rmdir
        // that `remove_cgroup` performs.
        fs::remove_file(cgroup_dir.join("cpu.max")).unwrap();
        fs::remove_file(cgroup_dir.join("memory.max")).unwrap();
        remove_cgroup(&cgroup_dir).unwrap();
        assert!(!cgroup_dir.exists());
    }

    #[test]
    fn test_remove_cgroup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cgroup_dir = dir.path().join("does-not-exist");
        assert!(remove_cgroup(&cgroup_dir).is_ok());
    }
}
