//! C4: the supervisor.
//!
//! Forks the judgee, prepares it via C1/C2 in the child branch, then drives
//! it from the parent through a ptrace-syscall loop: wait, sample memory,
//! resume, until the child exits or stops for a reason that is not a
//! syscall-stop. A concurrently running timer thread enforces the
//! wall-clock deadline. `spec.md` §4.4.

use std::ffi::c_void;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use libc::{c_int, c_long, pid_t};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{execve, fork, getpid, ForkResult, Pid};

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::exec::NativeExecSpec;
use crate::isolation;
use crate::memory::{MemoryMetric, MemorySampler};
use crate::limits::Limits;
use crate::policy::SecurityPolicy;
use crate::result::RunResult;
use crate::seccomp;

/// Serializes the pre-fork/fork/pre-exec sequence across concurrent
/// `Sandbox::run` calls in this process, per `spec.md` §9 "Global
/// fork-lock": no other task may run `setrlimit`/`chdir`/`unshare`
/// concurrently with an in-flight child setup.
static FORK_LOCK: Mutex<()> = Mutex::new(());

// PTRACE_* request numbers and option bits, taken directly from
// `<sys/ptrace.h>` on Linux. Defined locally rather than through `libc` or
// `nix`'s `ptrace` module; see DESIGN.md for why.
const PTRACE_TRACEME: c_int = 0;
const PTRACE_CONT: c_int = 7;
const PTRACE_KILL: c_int = 8;
const PTRACE_SYSCALL: c_int = 24;
const PTRACE_GETREGS: c_int = 12;
const PTRACE_SETOPTIONS: c_int = 0x4200;
const PTRACE_O_TRACESYSGOOD: c_long = 0x0000_0001;

/// The exit status the child uses to signal the parent that pre-exec setup
/// or `execve` failed. Not a real child exit code the judgee ever produces.
const CHILD_STARTUP_FAILURE_EXIT: i32 = 127;

unsafe fn ptrace_raw(request: c_int, pid: pid_t, addr: usize, data: usize) -> c_long {
    libc::ptrace(request, pid, addr as *mut c_void, data as *mut c_void)
}

fn ptrace_checked(request: c_int, pid: Pid, addr: usize, data: usize) -> Result<c_long> {
    // None of the requests used here (TRACEME, SETOPTIONS, SYSCALL, KILL,
    // GETREGS) ever legitimately return -1 on success, so treating a
    // negative return as failure is safe.
    let ret = unsafe { ptrace_raw(request, pid.as_raw(), addr, data) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error())
            .chain_err(|| ErrorKind::PtraceAttach(format!("ptrace({}) failed", request)));
    }
    Ok(ret)
}

/// A cancellation handle shared between the caller and a running
/// `Sandbox::run`. Cloning shares the same underlying pid slot; calling
/// `cancel()` from any clone sends `SIGKILL` to whichever child is
/// currently registered, if any.
#[derive(Clone)]
pub struct CancelHandle {
    pid: Arc<AtomicI32>,
}

impl CancelHandle {
    /// Create a handle with no child registered yet.
    pub fn new() -> CancelHandle {
        CancelHandle {
            pid: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Request cancellation. A no-op if no child is currently registered
    /// (the run has not started, or has already finished): cancellation
    /// after child exit is a no-op per `spec.md` §5.
    pub fn cancel(&self) {
        let raw = self.pid.load(Ordering::SeqCst);
        if raw != 0 {
            let _ = kill(Pid::from_raw(raw), Signal::SIGKILL);
        }
    }

    fn register(&self, pid: Pid) {
        self.pid.store(pid.as_raw(), Ordering::SeqCst);
    }

    fn clear(&self) {
        self.pid.store(0, Ordering::SeqCst);
    }
}

impl Default for CancelHandle {
    fn default() -> CancelHandle {
        CancelHandle::new()
    }
}

/// Everything the child's pre-exec branch needs, gathered up front in the
/// parent so the child branch itself does no fallible allocation beyond
/// what isolation/seccomp already need.
pub(crate) struct ChildSetup<'a> {
    pub cgroup_dir: &'a PathBuf,
    pub limits: &'a Limits,
    pub policy: &'a SecurityPolicy,
    pub output_fd: RawFd,
    pub stdin_fd: Option<RawFd>,
    pub stderr_fd: Option<RawFd>,
}

/// Run the full C1 → fd redirection → C2 sequence on the calling (child)
/// task. Never called from the parent.
fn prepare_child(setup: &ChildSetup) -> Result<()> {
    isolation::create_cgroup(setup.cgroup_dir, setup.limits)?;
    isolation::attach_cgroup(setup.cgroup_dir, getpid().as_raw())?;
    isolation::apply_rlimits(setup.limits)?;
    isolation::unshare_namespaces()?;
    isolation::apply_chroot(setup.policy.chroot_dir.as_ref())?;
    isolation::drop_credentials(setup.policy)?;

    nix::unistd::dup2(setup.output_fd, libc::STDOUT_FILENO)?;
    if let Some(fd) = setup.stdin_fd {
        nix::unistd::dup2(fd, libc::STDIN_FILENO)?;
    }
    if let Some(fd) = setup.stderr_fd {
        nix::unistd::dup2(fd, libc::STDERR_FILENO)?;
    }

    // NO_NEW_PRIVS is set unconditionally regardless of whether a filter is
    // installed, so a setuid binary in the judgee can never regain
    // privilege through this path.
    seccomp::set_no_new_privs().map_err(|e| Error::from(ErrorKind::SeccompLoad(e.to_string())))?;
    if setup.policy.needs_seccomp() {
        let policy_vec = setup.policy.syscall_policy.as_ref().unwrap();
        seccomp::load_filter(policy_vec, setup.policy.deny_action)
            .map_err(|e| Error::from(ErrorKind::SeccompLoad(e.to_string())))?;
    }

    Ok(())
}

/// The child branch: never returns to shared parent code. Runs
/// `prepare_child`, then execs; on any failure along the way it reports
/// the failure by exiting with `CHILD_STARTUP_FAILURE_EXIT` rather than
/// falling back into the parent's call stack.
fn child_trampoline(setup: &ChildSetup, exec: &NativeExecSpec) -> ! {
    // Let the parent single-step us through syscalls from here on.
    if unsafe { ptrace_raw(PTRACE_TRACEME, 0, 0, 0) } == -1 {
        unsafe { libc::_exit(CHILD_STARTUP_FAILURE_EXIT) };
    }

    let outcome = prepare_child(setup).and_then(|_| {
        execve(&exec.path, &exec.argv, &exec.env)
            .chain_err(|| ErrorKind::ChildStartupFailed("execve failed".to_owned()))
            .map(|_| ())
    });

    if let Err(e) = outcome {
        eprintln!("sandbox: child failed to start: {}", e);
    }
    unsafe { libc::_exit(CHILD_STARTUP_FAILURE_EXIT) };
}

/// Fork and run `setup`/`exec` in the child. Returns the child's pid to the
/// parent. The fork lock is held for the duration of the call so no other
/// task's task-scoped mutation (rlimits, cwd, namespaces) interleaves with
/// this child's pre-exec sequence.
fn fork_and_exec(setup: &ChildSetup, exec: &NativeExecSpec) -> Result<Pid> {
    let _guard = FORK_LOCK.lock().unwrap();
    match unsafe { fork() }.chain_err(|| ErrorKind::SupervisorFailure("fork failed".to_owned()))? {
        ForkResult::Child => child_trampoline(setup, exec),
        ForkResult::Parent { child } => Ok(child),
    }
}

/// Shared state the wall-clock timer waits on: a `done` flag plus the
/// `Condvar` that wakes the timer early when the supervisor loop sets it.
/// `spec.md` §5: "The timer is cancellable; cancellation fires when the
/// child exits naturally first."
type DoneFlag = Arc<(Mutex<bool>, Condvar)>;

/// Spawn the wall-clock timer. It waits on `done` for up to `real_time_ms`
/// and sends `SIGKILL` to `pid` only if the deadline elapsed without `done`
/// being set; if the supervisor loop sets `done` and notifies first (the
/// child exited on its own), the timer wakes immediately instead of
/// sleeping out the full deadline. Returns a handle the supervisor joins
/// after the child has exited.
fn spawn_wall_clock_timer(
    pid: Pid,
    real_time_ms: u64,
    done: DoneFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let (lock, condvar) = &*done;
        let guard = lock.lock().unwrap();
        let (guard, timeout_result) = condvar
            .wait_timeout_while(guard, Duration::from_millis(real_time_ms), |done| !*done)
            .unwrap();
        if timeout_result.timed_out() && !*guard {
            let _ = kill(pid, Signal::SIGKILL);
        }
    })
}

/// Outcome of the blocking parent-side wait loop: either the child is still
/// running (and has just been resumed) or it has terminated.
enum LoopStep {
    Continue,
    Terminated(RunResult),
}

/// Drive one iteration of the parent's wait loop. `peak_memory_kb` is
/// updated in place; `result` accumulates signal/runtime-error state as the
/// child's fate becomes known.
fn wait_step(
    pid: Pid,
    sampler: &MemorySampler,
    memory_metric: MemoryMetric,
    peak_memory_kb: &mut u64,
) -> Result<LoopStep> {
    let mut status: c_int = 0;
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    let waited = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut rusage) };
    if waited == -1 {
        return Err(std::io::Error::last_os_error())
            .chain_err(|| ErrorKind::SupervisorFailure("wait4 failed".to_owned()));
    }

    if unsafe { libc::WIFEXITED(status) } {
        let mut result = RunResult::new();
        result.memory_kb = *peak_memory_kb;
        fill_cpu_time(&mut result, &rusage);
        let exit_code = unsafe { libc::WEXITSTATUS(status) };
        if exit_code == CHILD_STARTUP_FAILURE_EXIT {
            result.set_runtime_error(format!(
                "child exited with startup-failure code {}",
                exit_code
            ));
        } else if exit_code != 0 {
            result.set_runtime_error(format!("judgee exited with status {}", exit_code));
        }
        return Ok(LoopStep::Terminated(result));
    }

    if unsafe { libc::WIFSIGNALED(status) } {
        let mut result = RunResult::new();
        result.memory_kb = *peak_memory_kb;
        fill_cpu_time(&mut result, &rusage);
        result.signal = Some(unsafe { libc::WTERMSIG(status) });
        result.re_flag = true;
        return Ok(LoopStep::Terminated(result));
    }

    if unsafe { libc::WIFSTOPPED(status) } {
        let stop_sig = unsafe { libc::WSTOPSIG(status) };
        let is_syscall_stop = stop_sig == (libc::SIGTRAP | 0x80);

        if is_syscall_stop {
            // Auditing hook: read registers so a future accounting layer
            // can inspect `orig_rax` (the syscall number). Failures here
            // are not fatal to the run; this is observational.
            let _ = read_syscall_number(pid);

            let sample = sampler.sample();
            let current_kb = sample.selected(memory_metric).kilobytes();
            if current_kb > *peak_memory_kb {
                *peak_memory_kb = current_kb;
            }

            ptrace_checked(PTRACE_SYSCALL, pid, 0, 0)?;
            return Ok(LoopStep::Continue);
        }

        if stop_sig == libc::SIGTRAP {
            // The very first stop after PTRACE_TRACEME + execve is a plain
            // SIGTRAP, not yet tagged by PTRACE_O_TRACESYSGOOD (which we
            // install right here, on observing it). Treat it as the
            // "Execed" state transition in spec.md §4.4's state machine.
            ptrace_checked(
                PTRACE_SETOPTIONS,
                pid,
                0,
                PTRACE_O_TRACESYSGOOD as usize,
            )?;
            ptrace_checked(PTRACE_SYSCALL, pid, 0, 0)?;
            return Ok(LoopStep::Continue);
        }

        // Any other stop signal (SIGSEGV, SIGXCPU, SIGXFSZ, SIGSYS from a
        // seccomp kill that stops rather than kills, ...) is not part of
        // the expected syscall-stop cycle: kill the child and reap it.
        let mut result = RunResult::new();
        result.memory_kb = *peak_memory_kb;
        result.signal = Some(stop_sig);
        result.re_flag = true;
        let _ = ptrace_checked(PTRACE_KILL, pid, 0, 0);
        let mut reap_status: c_int = 0;
        unsafe { libc::wait4(pid.as_raw(), &mut reap_status, 0, std::ptr::null_mut()) };
        return Ok(LoopStep::Terminated(result));
    }

    Ok(LoopStep::Continue)
}

fn fill_cpu_time(result: &mut RunResult, rusage: &libc::rusage) {
    let user_ms = rusage.ru_utime.tv_sec as u64 * 1000 + rusage.ru_utime.tv_usec as u64 / 1000;
    let sys_ms = rusage.ru_stime.tv_sec as u64 * 1000 + rusage.ru_stime.tv_usec as u64 / 1000;
    result.cpu_time_ms = user_ms + sys_ms;
}

#[cfg(target_arch = "x86_64")]
fn read_syscall_number(pid: Pid) -> Result<i64> {
    let mut regs: libc::user_regs_struct = unsafe { std::mem::zeroed() };
    ptrace_checked(
        PTRACE_GETREGS,
        pid,
        0,
        &mut regs as *mut libc::user_regs_struct as usize,
    )?;
    Ok(regs.orig_rax as i64)
}

#[cfg(not(target_arch = "x86_64"))]
fn read_syscall_number(_pid: Pid) -> Result<i64> {
    Ok(-1)
}

/// Run one supervised child to completion: fork, prepare, drive the
/// ptrace-syscall loop, enforce the wall-clock deadline, and collect the
/// final `RunResult`.
pub(crate) fn run_supervised(
    setup: &ChildSetup,
    exec: &NativeExecSpec,
    real_time_ms: u64,
    memory_metric: MemoryMetric,
    cancel: &CancelHandle,
) -> Result<RunResult> {
    let start = Instant::now();
    let pid = fork_and_exec(setup, exec)?;
    cancel.register(pid);

    let sampler = MemorySampler::open(pid.as_raw())?;
    let done: DoneFlag = Arc::new((Mutex::new(false), Condvar::new()));

    let timer = if real_time_ms > 0 {
        Some(spawn_wall_clock_timer(pid, real_time_ms, Arc::clone(&done)))
    } else {
        None
    };

    let mut peak_memory_kb: u64 = 0;
    let run_result = loop {
        match wait_step(pid, &sampler, memory_metric, &mut peak_memory_kb) {
            Ok(LoopStep::Continue) => continue,
            Ok(LoopStep::Terminated(mut result)) => {
                result.real_time_ms = start.elapsed().as_millis() as u64;
                break Ok(result);
            }
            Err(e) => break Err(e),
        }
    };

    {
        let (lock, condvar) = &*done;
        let mut guard = lock.lock().unwrap();
        *guard = true;
        condvar.notify_one();
    }
    cancel.clear();
    if let Some(timer) = timer {
        let _ = timer.join();
    }

    run_result
}
