//! C6: output checker.
//!
//! Compares the judgee's captured output against a reference under one of
//! two equivalences. Both modes stream through a `BufReader` rather than
//! loading either file wholesale, since either may be tens of megabytes
//! (bounded only by `RLIMIT_FSIZE`). `spec.md` §4.6 deliberately excludes
//! the token/space-split checker the teacher's `judge` crate and
//! `original_source/check.go` both carry: it is not a general-purpose
//! equivalence and has no place in the core.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Which output equivalence a check uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CheckMode {
    /// Byte-for-byte comparison.
    Byte,

    /// Line-by-line comparison with trailing whitespace stripped from each
    /// line before comparing.
    Line,
}

/// The kind of failure a check reports. Mirrors the `System`/`Content` split
/// of the error taxonomy in `spec.md` §7: a content mismatch is a verdict
/// the grader can act on; a system failure (an unreadable file) means no
/// verdict could be produced at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The two outputs diverge under the configured equivalence.
    Content,

    /// The comparison itself could not be completed (a file could not be
    /// opened or read).
    System,
}

/// Result of an output comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Fail(ErrorKind, String),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckOutcome::Success)
    }
}

/// Compare `candidate` against `reference` under `mode`.
pub fn check(candidate: &Path, reference: &Path, mode: CheckMode) -> CheckOutcome {
    let candidate_file = match File::open(candidate) {
        Ok(f) => f,
        Err(e) => {
            return CheckOutcome::Fail(
                ErrorKind::System,
                format!("failed to open candidate output: {}", e),
            )
        }
    };
    let reference_file = match File::open(reference) {
        Ok(f) => f,
        Err(e) => {
            return CheckOutcome::Fail(
                ErrorKind::System,
                format!("failed to open reference output: {}", e),
            )
        }
    };

    match mode {
        CheckMode::Byte => check_bytes(candidate_file, reference_file),
        CheckMode::Line => check_lines(candidate_file, reference_file),
    }
}

fn check_bytes(candidate: File, reference: File) -> CheckOutcome {
    let mut candidate = BufReader::new(candidate);
    let mut reference = BufReader::new(reference);

    let mut candidate_byte = [0u8; 1];
    let mut reference_byte = [0u8; 1];
    let mut offset: u64 = 0;

    loop {
        let candidate_n = match read_exact_or_eof(&mut candidate, &mut candidate_byte) {
            Ok(n) => n,
            Err(e) => {
                return CheckOutcome::Fail(
                    ErrorKind::System,
                    format!("error reading candidate output: {}", e),
                )
            }
        };
        let reference_n = match read_exact_or_eof(&mut reference, &mut reference_byte) {
            Ok(n) => n,
            Err(e) => {
                return CheckOutcome::Fail(
                    ErrorKind::System,
                    format!("error reading reference output: {}", e),
                )
            }
        };

        match (candidate_n, reference_n) {
            (0, 0) => return CheckOutcome::Success,
            (0, _) | (_, 0) => {
                return CheckOutcome::Fail(
                    ErrorKind::Content,
                    format!("length mismatch: diverged at byte offset {}", offset),
                )
            }
            (_, _) => {
                if candidate_byte[0] != reference_byte[0] {
                    return CheckOutcome::Fail(
                        ErrorKind::Content,
                        format!("content mismatch: diverged at byte offset {}", offset),
                    );
                }
            }
        }

        offset += 1;
    }
}

/// Read exactly `buf.len()` bytes, or report how many were actually read
/// before hitting EOF (0 on immediate EOF).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match reader.read(buf) {
        Ok(n) => Ok(n),
        Err(e) => Err(e),
    }
}

fn check_lines(candidate: File, reference: File) -> CheckOutcome {
    let mut candidate = BufReader::new(candidate).lines();
    let mut reference = BufReader::new(reference).lines();
    let mut line_number: u64 = 0;

    loop {
        line_number += 1;
        let candidate_line = match candidate.next() {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                return CheckOutcome::Fail(
                    ErrorKind::System,
                    format!("error reading candidate output: {}", e),
                )
            }
            None => None,
        };
        let reference_line = match reference.next() {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                return CheckOutcome::Fail(
                    ErrorKind::System,
                    format!("error reading reference output: {}", e),
                )
            }
            None => None,
        };

        match (candidate_line, reference_line) {
            (None, None) => return CheckOutcome::Success,
            (None, Some(expected)) => {
                return CheckOutcome::Fail(
                    ErrorKind::Content,
                    format!(
                        "length mismatch: expected line {} (\"{}\"), but found EOF",
                        line_number,
                        trim_trailing(&expected)
                    ),
                )
            }
            (Some(got), None) => {
                return CheckOutcome::Fail(
                    ErrorKind::Content,
                    format!(
                        "length mismatch: expected EOF, but found line {} (\"{}\")",
                        line_number,
                        trim_trailing(&got)
                    ),
                )
            }
            (Some(got), Some(expected)) => {
                let got = trim_trailing(&got);
                let expected = trim_trailing(&expected);
                if got != expected {
                    return CheckOutcome::Fail(
                        ErrorKind::Content,
                        format!(
                            "content mismatch at line {}: expected \"{}\", got \"{}\"",
                            line_number, expected, got
                        ),
                    );
                }
            }
        }
    }
}

/// Strip trailing spaces, tabs, CR and LF from a line. `BufRead::lines`
/// already strips the LF (and a preceding CR on Windows-style input); this
/// additionally strips trailing horizontal whitespace per `spec.md` §4.6.
fn trim_trailing(line: &str) -> &str {
    line.trim_end_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_byte_mode_identical_files_succeed() {
        let a = write_temp(b"hello\n");
        let b = write_temp(b"hello\n");
        assert_eq!(check(a.path(), b.path(), CheckMode::Byte), CheckOutcome::Success);
    }

    #[test]
    fn test_byte_mode_detects_content_mismatch() {
        let a = write_temp(b"1 2 3\n");
        let b = write_temp(b"1 2 4\n");
        match check(a.path(), b.path(), CheckMode::Byte) {
            CheckOutcome::Fail(ErrorKind::Content, _) => (),
            other => panic!("expected Fail(Content, _), got {:?}", other),
        }
    }

    #[test]
    fn test_byte_mode_detects_length_mismatch() {
        let a = write_temp(b"hello");
        let b = write_temp(b"hello world");
        match check(a.path(), b.path(), CheckMode::Byte) {
            CheckOutcome::Fail(ErrorKind::Content, msg) => assert!(msg.contains("length")),
            other => panic!("expected Fail(Content, _), got {:?}", other),
        }
    }

    #[test]
    fn test_line_mode_ignores_trailing_whitespace() {
        let a = write_temp(b"hello  \nworld\t\n");
        let b = write_temp(b"hello\nworld\n");
        assert_eq!(check(a.path(), b.path(), CheckMode::Line), CheckOutcome::Success);
    }

    #[test]
    fn test_line_mode_detects_content_mismatch() {
        let a = write_temp(b"1 2 3\n");
        let b = write_temp(b"1 2 4\n");
        match check(a.path(), b.path(), CheckMode::Line) {
            CheckOutcome::Fail(ErrorKind::Content, msg) => assert!(msg.contains("content mismatch")),
            other => panic!("expected Fail(Content, _), got {:?}", other),
        }
    }

    #[test]
    fn test_line_mode_detects_extra_trailing_line() {
        let a = write_temp(b"hello\nextra\n");
        let b = write_temp(b"hello\n");
        match check(a.path(), b.path(), CheckMode::Line) {
            CheckOutcome::Fail(ErrorKind::Content, _) => (),
            other => panic!("expected Fail(Content, _), got {:?}", other),
        }
    }

    #[test]
    fn test_check_reports_system_error_on_missing_file() {
        let b = write_temp(b"hello\n");
        match check(Path::new("/nonexistent/path"), b.path(), CheckMode::Byte) {
            CheckOutcome::Fail(ErrorKind::System, _) => (),
            other => panic!("expected Fail(System, _), got {:?}", other),
        }
    }
}
