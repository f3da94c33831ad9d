use std::fmt;

use crate::{BridgeStats, ChannelStats};

/// Exit status for a clean run.
pub const SUCCESS_EXIT_CODE: i32 = 0;
/// Exit status when the DUT reported an internal inconsistency.
pub const EVALUATION_FAILURE_EXIT_CODE: i32 = 1;
/// Exit status when the cycle budget ran out first.
pub const TIMEOUT_EXIT_CODE: i32 = 2;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TerminationCause {
    /// The transport finished with a zero status.
    Completed,
    /// The transport finished with a non-zero status.
    TransportFailure {
        /// Status reported by the transport.
        code: i32,
    },
    /// The DUT's combinational phase failed.
    EvaluationFailure,
    /// The cycle budget was exhausted before the transport finished.
    Timeout,
}

impl TerminationCause {
    /// Process exit status for this cause.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Completed => SUCCESS_EXIT_CODE,
            Self::TransportFailure { code } => code,
            Self::EvaluationFailure => EVALUATION_FAILURE_EXIT_CODE,
            Self::Timeout => TIMEOUT_EXIT_CODE,
        }
    }

    /// Returns `true` for every cause except [`TerminationCause::Completed`].
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::TransportFailure { code } => write!(f, "code = {code}"),
            Self::EvaluationFailure => f.write_str("evaluation error"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunSummary {
    /// Why the run stopped.
    pub cause: TerminationCause,
    /// Final cycle count, relative to the last marker reset.
    pub cycles: u64,
    /// Seed the DUT was initialised with.
    pub seed: u32,
    /// Cycle counts reported at each stop marker, in order.
    pub benchmark_cycles: Vec<u64>,
    /// Number of start markers observed.
    pub counter_resets: u64,
    /// DUT diagnostic for an evaluation failure.
    pub eval_error: Option<String>,
    /// Per-channel memory adapter counters.
    pub channels: Vec<ChannelStats>,
    /// Host bridge counters.
    pub host: BridgeStats,
    /// Cycles written to the trace; zero when tracing was off.
    pub trace_records: u64,
}

impl RunSummary {
    /// Process exit status for this run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.cause.exit_code()
    }

    /// Reproduction line for failed runs; `None` for completed runs.
    #[must_use]
    pub fn failure_line(&self) -> Option<String> {
        self.cause.is_failure().then(|| {
            format!(
                "*** FAILED *** ({}, seed {}) after {} cycles",
                self.cause, self.seed, self.cycles
            )
        })
    }

    /// Completion line printed for successful runs on request.
    #[must_use]
    pub fn completion_line(&self) -> String {
        format!("Completed after {} cycles", self.cycles)
    }
}
