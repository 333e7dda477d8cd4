//! Description of the program the sandbox should execute.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// Check if the given string slice is a valid C-style string, i.e. it does
/// not contain an embedded NUL byte.
fn is_valid_c_string(s: &str) -> bool {
    !s.as_bytes().contains(&b'\x00')
}

/// Describes the program to execute: the binary, its argv and its
/// environment. Both argv and env fully replace the host's; there is no
/// inheritance unless the caller explicitly copies entries over.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExecSpec {
    /// Absolute path of the binary to invoke.
    pub path: PathBuf,

    /// Ordered argv, starting at `argv[0]`.
    pub argv: Vec<String>,

    /// Ordered `"KEY=VAL"` environment entries.
    pub env: Vec<String>,
}

impl ExecSpec {
    /// Create a new `ExecSpec` with `argv[0]` defaulted to `path` and an
    /// empty environment.
    pub fn new<P: AsRef<Path>>(path: P) -> ExecSpec {
        let path = path.as_ref().to_path_buf();
        let argv0 = path.to_string_lossy().into_owned();
        ExecSpec {
            path,
            argv: vec![argv0],
            env: Vec::new(),
        }
    }

    /// Append an argument to argv.
    pub fn arg<S: Into<String>>(&mut self, arg: S) -> &mut ExecSpec {
        self.argv.push(arg.into());
        self
    }

    /// Append a `"KEY=VAL"` entry to the environment.
    pub fn env<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) -> &mut ExecSpec {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Validate and convert this spec into the native, NUL-terminated
    /// representation `execve` needs.
    pub(crate) fn to_native(&self) -> Result<NativeExecSpec> {
        if self.argv.is_empty() {
            bail!(ErrorKind::EmptyArgv);
        }

        let path = native_c_string(&self.path.to_string_lossy())?;
        let argv = self
            .argv
            .iter()
            .map(|arg| native_c_string(arg))
            .collect::<Result<Vec<CString>>>()?;
        let env = self
            .env
            .iter()
            .map(|entry| native_c_string(entry))
            .collect::<Result<Vec<CString>>>()?;

        Ok(NativeExecSpec { path, argv, env })
    }
}

fn native_c_string(s: &str) -> Result<CString> {
    if !is_valid_c_string(s) {
        bail!(ErrorKind::InvalidCString(s.to_owned()));
    }
    // `is_valid_c_string` already rejected embedded NULs, so this cannot fail.
    Ok(CString::new(s).expect("string without NUL bytes must convert to CString"))
}

/// The validated, NUL-terminated form of an `ExecSpec`, ready to be passed to
/// `execve`. Built once in the parent (where allocation and error handling
/// are safe) and carried into the child across `fork`.
pub(crate) struct NativeExecSpec {
    pub path: CString,
    pub argv: Vec<CString>,
    pub env: Vec<CString>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_c_string() {
        assert!(is_valid_c_string("abc123"));
        assert!(!is_valid_c_string("abc\x00123"));
    }

    #[test]
    fn test_to_native_rejects_empty_argv() {
        let spec = ExecSpec {
            path: PathBuf::from("/bin/true"),
            argv: Vec::new(),
            env: Vec::new(),
        };
        match spec.to_native() {
            Err(Error(ErrorKind::EmptyArgv, _)) => (),
            other => panic!("expected EmptyArgv, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_to_native_rejects_embedded_nul() {
        let mut spec = ExecSpec::new("/bin/echo");
        spec.arg("hello\x00world");
        assert!(spec.to_native().is_err());
    }

    #[test]
    fn test_new_defaults_argv0_to_path() {
        let spec = ExecSpec::new("/bin/echo");
        assert_eq!(spec.argv, vec!["/bin/echo".to_owned()]);
    }

    #[test]
    fn test_env_builder_formats_key_value() {
        let mut spec = ExecSpec::new("/bin/echo");
        spec.env("PATH", "/usr/bin");
        assert_eq!(spec.env, vec!["PATH=/usr/bin".to_owned()]);
    }
}
