//! Resource limits a judged program runs under.

/// Resource limits applied to the judgee. All fields are non-negative; a
/// value of zero means the corresponding limit is unset (not enforced).
///
/// Units follow `original_source/limit.go` exactly: CPU and wall-clock time
/// in milliseconds, memory and stack in kilobytes, output size in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// CPU time limit, in milliseconds. Zero means unset.
    pub cpu_time_ms: u64,

    /// Wall-clock time limit, in milliseconds. Zero means unset.
    pub real_time_ms: u64,

    /// Peak address-space memory limit, in kilobytes. Zero means unset.
    pub memory_kb: u64,

    /// Stack size limit, in kilobytes. Zero means unset.
    pub stack_kb: u64,

    /// Maximum size of the output file, in bytes. Zero means unset.
    pub output_size_bytes: u64,
}

impl Limits {
    /// Create a `Limits` value with every limit unset.
    pub fn unset() -> Limits {
        Limits::default()
    }

    pub fn has_cpu_time_limit(&self) -> bool {
        self.cpu_time_ms > 0
    }

    pub fn has_real_time_limit(&self) -> bool {
        self.real_time_ms > 0
    }

    pub fn has_memory_limit(&self) -> bool {
        self.memory_kb > 0
    }

    pub fn has_stack_limit(&self) -> bool {
        self.stack_kb > 0
    }

    pub fn has_output_size_limit(&self) -> bool {
        self.output_size_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use super::Limits;

    #[test]
    fn test_unset_limits_have_no_flags_set() {
        let limits = Limits::unset();
        assert!(!limits.has_cpu_time_limit());
        assert!(!limits.has_real_time_limit());
        assert!(!limits.has_memory_limit());
        assert!(!limits.has_stack_limit());
        assert!(!limits.has_output_size_limit());
    }

    #[test]
    fn test_limit_flags_follow_nonzero_fields() {
        let limits = Limits {
            cpu_time_ms: 1000,
            real_time_ms: 0,
            memory_kb: 65536,
            stack_kb: 0,
            output_size_bytes: 0,
        };
        assert!(limits.has_cpu_time_limit());
        assert!(!limits.has_real_time_limit());
        assert!(limits.has_memory_limit());
    }
}
