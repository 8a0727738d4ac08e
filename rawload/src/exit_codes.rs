#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run was aborted (failure-rate threshold or adaptive backoff exhausted).
    Aborted = 10,

    /// The run was cancelled (Ctrl-C).
    Cancelled = 11,

    /// Invalid CLI/config input (bad flags, malformed config JSON, bad headers, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, a faulted run).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_results(results: &rawload_core::Results) -> Self {
        if results.aborted {
            Self::Aborted
        } else if results.cancelled {
            Self::Cancelled
        } else {
            Self::Success
        }
    }
}
