//! The error type used throughout this crate.
//!
//! Every `ErrorKind` variant here corresponds to a `System` error as defined
//! by the error taxonomy: a precondition was violated or a host facility is
//! unavailable, so the judge cannot even start, let alone report a verdict.
//! Conditions attributable to the judged program itself (a crash, a denied
//! syscall, an OOM kill) never surface as an `Error`; they are folded into
//! `RunResult` by the supervisor instead, so `Run` can still return `Ok`.

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
    }

    errors {
        /// A cgroup v2 controller file could not be created or written. This
        /// also fires when the configured cgroup path turns out to be a v1
        /// hierarchy; the crate does not support cgroup v1.
        CgroupSetup(path: ::std::path::PathBuf, reason: String) {
            description("failed to set up cgroup v2 node")
            display("failed to set up cgroup v2 node at {}: {}", path.display(), reason)
        }

        /// Namespace isolation (`unshare`) failed in the child's pre-exec
        /// region.
        NamespaceSetup(reason: String) {
            description("failed to unshare namespaces")
            display("failed to unshare namespaces: {}", reason)
        }

        /// `chroot` failed in the child's pre-exec region.
        ChrootFailed(dir: ::std::path::PathBuf) {
            description("chroot failed")
            display("failed to chroot into {}", dir.display())
        }

        /// Loading the seccomp-BPF filter failed.
        SeccompLoad(reason: String) {
            description("failed to load seccomp filter")
            display("failed to load seccomp filter: {}", reason)
        }

        /// The output file could not be opened/truncated before exec.
        OutputFileOpen(path: ::std::path::PathBuf) {
            description("failed to open output file")
            display("failed to open output file at {}", path.display())
        }

        /// `PTRACE_ATTACH`/the initial `PTRACE_TRACEME` handshake failed,
        /// e.g. because the kernel's yama `ptrace_scope` forbids it.
        PtraceAttach(reason: String) {
            description("failed to attach ptrace to the child")
            display("failed to attach ptrace to the child: {}", reason)
        }

        /// The child reported startup failure (any pre-exec step failed) by
        /// exiting with the reserved child-startup-failure status.
        ChildStartupFailed(message: String) {
            description("child failed to start")
            display("child failed to start: {}", message)
        }

        /// The supervisor's wait loop observed something it has no
        /// handling for (e.g. `waitpid` itself failed).
        SupervisorFailure(reason: String) {
            description("supervisor loop failed")
            display("supervisor loop failed: {}", reason)
        }

        /// `argv` was empty; `spec.md` requires `argv.len() >= 1`.
        EmptyArgv {
            description("argv must contain at least one element")
        }

        /// An argv entry or environment entry contained an embedded NUL byte
        /// and cannot be represented as a C string.
        InvalidCString(what: String) {
            description("value is not a valid C string")
            display("value is not a valid C string: {}", what)
        }
    }
}
