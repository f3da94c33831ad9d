use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit status reported for any fatal setup failure.
pub const SETUP_FAILURE_EXIT_CODE: i32 = -1;

/// Internal inconsistency reported by the DUT's combinational phase.
///
/// Recoverable at the loop level: the run is wound down after the failing
/// cycle instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    /// Creates an evaluation error carrying the model's diagnostic.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the model's diagnostic text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fatal failures raised before the first simulated cycle.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Backing memory could not be allocated.
    #[error(
        "Failed to allocate {bytes} bytes ({mib} MiB) of memory\n\
         Set smaller amount of memory using +memsize=<N> (in MiB)"
    )]
    Allocation {
        /// Requested total size in bytes.
        bytes: u64,
        /// Requested total size in MiB.
        mib: u64,
    },
    /// The timing-accurate memory backend was requested but is unavailable.
    #[error("memory timing model is not available; run without +dramsim")]
    TimingModelUnavailable,
    /// Memory image could not be opened or read.
    #[error("could not read memory image {path}: {source}")]
    ImageRead {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Memory image contained a malformed line.
    #[error("memory image line {line}: {reason}")]
    ImageParse {
        /// 1-indexed line number.
        line: usize,
        /// Description of the malformed content.
        reason: String,
    },
    /// Memory image addressed bytes beyond the allocated backing store.
    #[error("memory image byte at offset {offset:#x} exceeds backing capacity")]
    ImageOutOfRange {
        /// Image byte offset that did not fit.
        offset: u64,
    },
    /// Host frame width cannot be carried by the transport bridge.
    #[error("host frame width of {bits} bits must be a whole number of bytes no wider than 64 bits")]
    HostWidth {
        /// Width reported by the DUT.
        bits: u32,
    },
    /// Backend count does not match the DUT's channel count.
    #[error("DUT exposes {expected} memory channels but {actual} backends were supplied")]
    ChannelMismatch {
        /// Channel count from the DUT geometry.
        expected: usize,
        /// Number of supplied backends.
        actual: usize,
    },
    /// Trace output could not be opened or its header written.
    #[error("could not open trace output {path}: {source}")]
    TraceOpen {
        /// Trace path (`-` for stdout).
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The DUT never raised its host clock edge while held in reset.
    #[error("host clock edge not observed within {cycles} reset cycles")]
    ResetTimeout {
        /// Number of reset cycles clocked before giving up.
        cycles: u64,
    },
    /// The DUT reported an internal inconsistency while held in reset.
    #[error("evaluation failed during reset: {0}")]
    ResetEvaluation(#[source] EvalError),
}

impl SetupError {
    /// Process exit status for this failure.
    ///
    /// Evaluation failures keep the evaluation-failure status even when they
    /// happen during reset; every other setup failure is negative.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ResetEvaluation(_) => crate::EVALUATION_FAILURE_EXIT_CODE,
            _ => SETUP_FAILURE_EXIT_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EvalError, SetupError, SETUP_FAILURE_EXIT_CODE};

    #[test]
    fn allocation_message_names_size_and_remedy() {
        let err = SetupError::Allocation {
            bytes: 3 << 30,
            mib: 3072,
        };
        let text = err.to_string();
        assert!(text.contains("3221225472 bytes (3072 MiB)"));
        assert!(text.contains("+memsize=<N>"));
    }

    #[test]
    fn setup_failures_exit_negative() {
        assert_eq!(
            SetupError::TimingModelUnavailable.exit_code(),
            SETUP_FAILURE_EXIT_CODE
        );
        assert!(SetupError::HostWidth { bits: 12 }.exit_code() < 0);
    }

    #[test]
    fn reset_evaluation_failure_keeps_evaluation_status() {
        let err = SetupError::ResetEvaluation(EvalError::new("assertion failed"));
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("assertion failed"));
    }
}
