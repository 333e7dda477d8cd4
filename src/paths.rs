//! Filesystem paths a `Sandbox` run touches.

use std::path::PathBuf;

/// Paths a `Sandbox` run touches. The user-output file must already exist
/// and be writable/truncatable; the cgroup directory is created by the
/// sandbox itself and removed on teardown.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Paths {
    /// Path to the writable output file the judgee's stdout is redirected
    /// to. Must exist and be truncatable before `run` is called.
    pub user_output: PathBuf,

    /// Optional path to the reference output, consumed by `check`.
    pub reference_output: Option<PathBuf>,

    /// Directory the sandbox will create and place the judgee into as a
    /// cgroup v2 node, then remove once the judgee has exited.
    pub cgroup_dir: PathBuf,

    /// Optional path the judgee's stdin is read from. `None` leaves fd 0
    /// whatever it already is in the child (typically `/dev/null` if the
    /// caller redirected it before `fork`).
    pub stdin: Option<PathBuf>,

    /// Optional path the judgee's stderr is redirected to. `None` leaves
    /// fd 2 as inherited from the supervisor.
    pub stderr: Option<PathBuf>,
}

impl Paths {
    pub fn new<P: Into<PathBuf>, C: Into<PathBuf>>(user_output: P, cgroup_dir: C) -> Paths {
        Paths {
            user_output: user_output.into(),
            reference_output: None,
            cgroup_dir: cgroup_dir.into(),
            stdin: None,
            stderr: None,
        }
    }

    pub fn with_reference_output<P: Into<PathBuf>>(mut self, reference_output: P) -> Paths {
        self.reference_output = Some(reference_output.into());
        self
    }

    pub fn with_stdin<P: Into<PathBuf>>(mut self, stdin: P) -> Paths {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_stderr<P: Into<PathBuf>>(mut self, stderr: P) -> Paths {
        self.stderr = Some(stderr.into());
        self
    }
}
