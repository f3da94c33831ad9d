//! Plus-argument configuration.
//!
//! Arguments the harness does not recognise are left for the host
//! transport, which receives the same argument list.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use cosim_core::{BackendKind, LoopConfig};

use crate::ConfigError;

/// Where trace output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceTarget {
    /// Standard output (`-v-`).
    Stdout,
    /// A file, created or truncated.
    File(PathBuf),
}

/// Settings for one simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Trace destination; tracing is off when `None`.
    pub trace: Option<TraceTarget>,
    /// Total memory in MiB; the DUT's default when `None`.
    pub memsize_mib: Option<u64>,
    /// Seed handed to the DUT.
    pub seed: u32,
    /// Memory backend to build for each channel.
    pub backend: BackendKind,
    /// Print DUT state from the trace start onwards.
    pub verbose: bool,
    /// Cycle budget; unbounded when `None`.
    pub max_cycles: Option<u64>,
    /// Hex image preloaded into memory.
    pub loadmem: Option<PathBuf>,
    /// First traced cycle after zero.
    pub trace_start: u64,
    /// Report the cycle count of completed runs.
    pub report_cycles: bool,
}

impl SimConfig {
    /// Settings used when no arguments are given.
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self {
            trace: None,
            memsize_mib: None,
            seed,
            backend: BackendKind::Magic,
            verbose: false,
            max_cycles: None,
            loadmem: None,
            trace_start: 0,
            report_cycles: false,
        }
    }

    /// Parses plus-arguments, starting from [`SimConfig::with_seed`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a recognised flag has a missing or
    /// malformed value.
    pub fn from_args<I, S>(args: I, default_seed: u32) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::with_seed(default_seed);

        for arg in args {
            let arg = arg.as_ref();
            if let Some(path) = arg.strip_prefix("-v") {
                config.trace = Some(match path {
                    "" => return Err(ConfigError::MissingValue { flag: "-v" }),
                    "-" => TraceTarget::Stdout,
                    path => TraceTarget::File(PathBuf::from(path)),
                });
            } else if let Some(value) = arg.strip_prefix("-s") {
                config.seed = parse_value("-s", value)?;
            } else if let Some(value) = arg.strip_prefix("+memsize=") {
                config.memsize_mib = Some(parse_value("+memsize", value)?);
            } else if let Some(value) = arg.strip_prefix("+max-cycles=") {
                config.max_cycles = Some(parse_value("+max-cycles", value)?);
            } else if let Some(value) = arg.strip_prefix("+start=") {
                config.trace_start = parse_value("+start", value)?;
            } else if let Some(path) = arg.strip_prefix("+loadmem=") {
                if path.is_empty() {
                    return Err(ConfigError::MissingValue { flag: "+loadmem" });
                }
                config.loadmem = Some(PathBuf::from(path));
            } else {
                match arg {
                    "+dramsim" => config.backend = BackendKind::Timing,
                    "+verbose" => config.verbose = true,
                    "+cycle-count" => config.report_cycles = true,
                    _ => log::debug!("leaving argument {arg:?} to the host transport"),
                }
            }
        }

        Ok(config)
    }

    /// Loop parameters derived from these settings.
    #[must_use]
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_cycles: self.max_cycles.unwrap_or(u64::MAX),
            trace_start: self.trace_start,
            verbose: self.verbose,
            seed: self.seed,
        }
    }
}

fn parse_value<T: FromStr>(flag: &'static str, value: &str) -> Result<T, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingValue { flag });
    }
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag,
        value: value.to_owned(),
    })
}

/// Seed used without `-s`: wall-clock seconds mixed with the process id.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn default_seed() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    (secs as u32) ^ std::process::id()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use cosim_core::BackendKind;
    use rstest::rstest;

    use super::{SimConfig, TraceTarget};
    use crate::ConfigError;

    fn parse(args: &[&str]) -> Result<SimConfig, ConfigError> {
        SimConfig::from_args(args.iter().copied(), 99)
    }

    #[test]
    fn no_arguments_yields_defaults() {
        let config = parse(&[]).expect("empty argument list is valid");
        assert_eq!(config, SimConfig::with_seed(99));
        assert_eq!(config.loop_config().max_cycles, u64::MAX);
    }

    #[test]
    fn parses_every_flag() {
        let config = parse(&[
            "-vtrace.vcd",
            "+memsize=256",
            "-s1234",
            "+dramsim",
            "+verbose",
            "+max-cycles=5000",
            "+loadmem=boot.hex",
            "+start=40",
            "+cycle-count",
        ])
        .expect("valid arguments should parse");

        assert_eq!(
            config,
            SimConfig {
                trace: Some(TraceTarget::File(PathBuf::from("trace.vcd"))),
                memsize_mib: Some(256),
                seed: 1234,
                backend: BackendKind::Timing,
                verbose: true,
                max_cycles: Some(5000),
                loadmem: Some(PathBuf::from("boot.hex")),
                trace_start: 40,
                report_cycles: true,
            }
        );
        let looped = config.loop_config();
        assert_eq!(looped.max_cycles, 5000);
        assert_eq!(looped.trace_start, 40);
        assert_eq!(looped.seed, 1234);
        assert!(looped.verbose);
    }

    #[test]
    fn dash_trace_path_means_stdout() {
        let config = parse(&["-v-"]).expect("stdout trace is valid");
        assert_eq!(config.trace, Some(TraceTarget::Stdout));
    }

    #[test]
    fn transport_arguments_are_ignored() {
        let config = parse(&["+permissive", "pk", "hello.elf", "+signature=out"])
            .expect("unknown arguments are not errors");
        assert_eq!(config, SimConfig::with_seed(99));
    }

    #[rstest]
    #[case("+max-cycles=lots", "+max-cycles")]
    #[case("+memsize=-4", "+memsize")]
    #[case("-s0x10", "-s")]
    #[case("+start=1.5", "+start")]
    fn malformed_numbers_are_rejected(#[case] arg: &str, #[case] flag: &str) {
        match parse(&[arg]) {
            Err(ConfigError::InvalidValue { flag: got, .. }) => assert_eq!(got, flag),
            other => panic!("expected invalid value for {flag}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("-v")]
    #[case("-s")]
    #[case("+loadmem=")]
    #[case("+max-cycles=")]
    fn empty_values_are_rejected(#[case] arg: &str) {
        assert!(matches!(
            parse(&[arg]),
            Err(ConfigError::MissingValue { .. })
        ));
    }

    #[test]
    fn later_flags_override_earlier_ones() {
        let config = parse(&["-s1", "-s2", "+start=3", "+start=4"]).expect("valid");
        assert_eq!(config.seed, 2);
        assert_eq!(config.trace_start, 4);
    }
}
