use cosim_core::{SetupError, SETUP_FAILURE_EXIT_CODE};
use thiserror::Error;

/// Malformed command-line argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A flag that requires a value was given none.
    #[error("missing value for {flag}")]
    MissingValue {
        /// Flag as written on the command line.
        flag: &'static str,
    },
    /// A numeric flag carried a value that does not parse.
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue {
        /// Flag as written on the command line.
        flag: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Any failure that prevents the first simulated cycle.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Argument parsing failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Memory, preload, trace or reset setup failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl HarnessError {
    /// Process exit status for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => SETUP_FAILURE_EXIT_CODE,
            Self::Setup(err) => err.exit_code(),
        }
    }
}
