//! C3: memory sampler.
//!
//! Reads `/proc/<pid>/status` and extracts the `Vm*` fields the supervisor
//! needs to track peak memory. This is a direct Rust port of the
//! byte-scanning state machine in `original_source/usage.go`
//! (`MemoryUsage`/`extractMemoryValue`): one `pread` into a fixed 4 KiB
//! buffer, one pass recognising line prefixes, tolerant of absent lines,
//! variable whitespace and a status file shorter than 4 KiB. No heap
//! allocation happens on the sampling path.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use crate::error::Result;
use crate::memory_size::MemorySize;

const STATUS_BUF_LEN: usize = 4096;

/// A single snapshot of `/proc/<pid>/status`'s `Vm*` fields, all in
/// kilobytes. Fields with no corresponding line in the status file read as
/// zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStatus {
    /// `VmSize:` (virtual memory size).
    pub vm_size_kb: u64,
    /// `VmRSS:` (resident set size).
    pub vm_rss_kb: u64,
    /// `VmData:` (data segment size).
    pub vm_data_kb: u64,
    /// `VmStk:` (stack segment size).
    pub vm_stk_kb: u64,
    /// `VmExe:` (text/executable segment size).
    pub vm_exe_kb: u64,
    /// `VmLib:` (shared library size).
    pub vm_lib_kb: u64,
}

impl MemoryStatus {
    /// The metric the supervisor tracks, per the given `MemoryMetric`
    /// selection.
    pub fn selected(&self, metric: MemoryMetric) -> MemorySize {
        let kb = match metric {
            MemoryMetric::VmData => self.vm_data_kb,
            MemoryMetric::VmRss => self.vm_rss_kb,
        };
        MemorySize::KiloBytes(kb)
    }
}

/// Which `Vm*` field the supervisor treats as "the" memory usage figure.
/// `spec.md` §4.3: "The supervisor uses VmData by default to approximate
/// resident working set excluding shared code pages; implementations may
/// use VmRSS instead provided the choice is documented and consistent."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryMetric {
    VmData,
    VmRss,
}

impl Default for MemoryMetric {
    fn default() -> MemoryMetric {
        MemoryMetric::VmData
    }
}

/// Samples `/proc/<pid>/status` for a single child process.
pub(crate) struct MemorySampler {
    file: File,
}

impl MemorySampler {
    /// Open `/proc/<pid>/status` for sampling. The fd is held open for the
    /// lifetime of the sampler so every `sample()` call is a single `pread`
    /// from offset zero, never a fresh `open`.
    pub fn open(pid: i32) -> Result<MemorySampler> {
        let path = PathBuf::from(format!("/proc/{}/status", pid));
        let file = File::open(&path)?;
        Ok(MemorySampler { file })
    }

    /// Take one sample. Returns a zeroed `MemoryStatus` if the process has
    /// already exited and `/proc/<pid>/status` can no longer be read; the
    /// supervisor's peak tracking simply keeps the previous maximum in that
    /// case.
    pub fn sample(&self) -> MemoryStatus {
        let mut buf = [0u8; STATUS_BUF_LEN];
        let n = match self.file.read_at(&mut buf, 0) {
            Ok(n) => n,
            Err(_) => return MemoryStatus::default(),
        };
        parse_status(&buf[..n])
    }
}

/// Parse the `Vm*` lines out of the contents of `/proc/<pid>/status`. Purely
/// a function of the bytes given so it is trivially unit-testable without a
/// real `/proc`.
fn parse_status(body: &[u8]) -> MemoryStatus {
    let mut status = MemoryStatus::default();

    for line in body.split(|&b| b == b'\n') {
        if let Some(rest) = strip_prefix(line, b"VmSize:") {
            status.vm_size_kb = parse_kb_value(rest);
        } else if let Some(rest) = strip_prefix(line, b"VmRSS:") {
            status.vm_rss_kb = parse_kb_value(rest);
        } else if let Some(rest) = strip_prefix(line, b"VmData:") {
            status.vm_data_kb = parse_kb_value(rest);
        } else if let Some(rest) = strip_prefix(line, b"VmStk:") {
            status.vm_stk_kb = parse_kb_value(rest);
        } else if let Some(rest) = strip_prefix(line, b"VmExe:") {
            status.vm_exe_kb = parse_kb_value(rest);
        } else if let Some(rest) = strip_prefix(line, b"VmLib:") {
            status.vm_lib_kb = parse_kb_value(rest);
        }
    }

    status
}

fn strip_prefix<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if line.len() >= prefix.len() && &line[..prefix.len()] == prefix {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Parse the decimal number in a line like `"   12345 kB"`, skipping leading
/// whitespace and stopping at the first non-digit. Returns 0 for malformed
/// or empty input rather than failing; the sampler must tolerate a short
/// read or an unexpected format.
fn parse_kb_value(rest: &[u8]) -> u64 {
    let mut value: u64 = 0;
    let mut seen_digit = false;
    for &b in rest {
        if b == b' ' || b == b'\t' {
            if seen_digit {
                break;
            }
            continue;
        }
        if b.is_ascii_digit() {
            seen_digit = true;
            value = value.saturating_mul(10).saturating_add((b - b'0') as u64);
        } else {
            break;
        }
    }
    value
}
