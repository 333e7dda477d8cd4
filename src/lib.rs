//! The core of an online-judge sandbox: runs an untrusted executable under
//! resource limits, namespace and seccomp isolation, supervises it via
//! ptrace, and compares its captured output against a reference.
//!
//! This crate is meant to be linked into a larger grading service. It has
//! no `main`, no CLI, no network surface, and no persistent storage beyond
//! the ephemeral cgroup node and the user-output file the judgee writes
//! to. The embedding application supplies a `SandboxConfig` and consumes a
//! `RunResult`/`CheckOutcome`.
//!
//! Only Linux is supported: the core depends on cgroup v2, Linux
//! namespaces, ptrace and seccomp-BPF, none of which exist elsewhere.

#![cfg(target_os = "linux")]

#[macro_use]
extern crate error_chain;

mod checker;
mod error;
mod exec;
mod isolation;
mod limits;
mod memory;
mod memory_size;
mod paths;
mod policy;
mod result;
mod rlimits;
mod sandbox;
mod seccomp;
mod supervisor;

pub use checker::{CheckMode, CheckOutcome};
pub use error::{Error, ErrorKind, Result};
pub use exec::ExecSpec;
pub use limits::Limits;
pub use memory::{MemoryMetric, MemoryStatus};
pub use memory_size::MemorySize;
pub use paths::Paths;
pub use policy::{SeccompDenyAction, SecurityPolicy};
pub use result::{RunResult, Status};
pub use sandbox::{new_sandbox, Sandbox, SandboxConfig};
pub use supervisor::CancelHandle;

pub use checker::ErrorKind as CheckErrorKind;
