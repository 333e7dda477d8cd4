//! Rust-friendly bindings to the native `rlimit` mechanism.

use libc::rlimit;

/// A resource governed by `setrlimit`.
#[repr(u32)]
#[derive(Clone, Copy, Debug)]
pub enum Resource {
    /// Limit, in seconds, on the amount of CPU time the process may
    /// consume. This variant corresponds to the `RLIMIT_CPU` native
    /// constant. Used only as a backstop behind the cgroup `cpu.max` cap.
    CpuTime = libc::RLIMIT_CPU,

    /// Maximum size, in bytes, of a file the process may create. This
    /// variant corresponds to the `RLIMIT_FSIZE` native constant.
    FileSize = libc::RLIMIT_FSIZE,

    /// Maximum size, in bytes, of the process's stack. This variant
    /// corresponds to the `RLIMIT_STACK` native constant.
    Stack = libc::RLIMIT_STACK,
}

/// The soft limit and the hard limit for some resource.
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimit {
    /// The soft limit of the resource.
    pub soft_limit: u64,

    /// The hard limit of the resource.
    pub hard_limit: u64,
}

impl ResourceLimit {
    fn as_native(&self) -> rlimit {
        rlimit {
            rlim_cur: self.soft_limit,
            rlim_max: self.hard_limit,
        }
    }
}

/// Set a resource limit for the calling process.
pub fn setrlimit(resource: Resource, limit: &ResourceLimit) -> std::io::Result<()> {
    let ret = unsafe { libc::setrlimit(resource as u32, &limit.as_native()) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Set a resource limit for the calling process, with soft and hard limit
/// both set to `limit`.
pub fn setrlimit_hard(resource: Resource, limit: u64) -> std::io::Result<()> {
    setrlimit(
        resource,
        &ResourceLimit {
            soft_limit: limit,
            hard_limit: limit,
        },
    )
}
