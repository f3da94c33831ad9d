//! Process glue around the co-simulation loop.
//!
//! A generated hardware model crate provides its [`Dut`] and host transport
//! and hands them to [`run_main`] together with the process arguments:
//!
//! ```ignore
//! fn main() {
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     let transport = Htif::new(&args);
//!     std::process::exit(cosim_harness::run_main(&args, Top::new(), transport));
//! }
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use cosim_core::memory::load_image_file;
use cosim_core::{
    allocate_channels, mib_to_bytes, BackendFactory, Dut, HostTransport, MagicBackendFactory,
    RunContext, RunSummary, SetupError, SimulationLoop, StopToken, TraceRecorder,
};

/// Plus-argument configuration.
pub mod config;
pub use config::{default_seed, SimConfig, TraceTarget};

mod errors;
pub use errors::{ConfigError, HarnessError};

/// SIGTERM registration.
pub mod signal;

/// Parses `args`, runs the DUT to termination and returns the exit status.
///
/// Setup failures are printed to stderr and yield a negative status (or the
/// evaluation-failure status if the DUT fails during reset). Otherwise the
/// status follows the run's termination cause.
pub fn run_main<D, T, I, S>(args: I, dut: D, transport: T) -> i32
where
    D: Dut,
    T: HostTransport,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    init_logging();

    let config = match SimConfig::from_args(args, default_seed()) {
        Ok(config) => config,
        Err(err) => return fail(&HarnessError::Config(err)),
    };
    let stop = match signal::install_sigterm_handler() {
        Ok(token) => token,
        Err(err) => {
            log::warn!("SIGTERM handler not installed: {err}");
            StopToken::new()
        }
    };

    match run(&config, dut, transport, &MagicBackendFactory, stop) {
        Ok(summary) => {
            report(&summary, &config, &mut io::stderr());
            summary.exit_code()
        }
        Err(err) => fail(&HarnessError::Setup(err)),
    }
}

/// Initialises `env_logger` once, defaulting to warnings when `RUST_LOG`
/// is unset.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn fail(err: &HarnessError) -> i32 {
    eprintln!("{err}");
    err.exit_code()
}

/// Builds memory, trace and loop from `config`, resets the DUT and runs it.
///
/// # Errors
///
/// Returns [`SetupError`] for any failure before the first simulated cycle.
pub fn run<D, T>(
    config: &SimConfig,
    mut dut: D,
    transport: T,
    factory: &dyn BackendFactory,
    stop: StopToken,
) -> Result<RunSummary, SetupError>
where
    D: Dut,
    T: HostTransport,
{
    let trace = config
        .trace
        .as_ref()
        .map(|target| open_trace(target, config.trace_start))
        .transpose()?;

    dut.init(config.seed);
    let geometry = dut.memory_geometry();
    let total_bytes = config
        .memsize_mib
        .map(mib_to_bytes)
        .transpose()?
        .unwrap_or(geometry.default_size_bytes);
    let mut backends = allocate_channels(factory, config.backend, total_bytes, &geometry)?;
    if let Some(path) = &config.loadmem {
        load_image_file(path, &mut backends, geometry.line_bytes)?;
    }

    let ctx = RunContext::new(config.loop_config(), dut, transport, backends);
    let mut sim = SimulationLoop::new(ctx, stop)?;
    if let Some(trace) = trace {
        sim = sim.with_trace(trace);
    }
    sim.reset()?;
    Ok(sim.run())
}

fn open_trace(target: &TraceTarget, start: u64) -> Result<TraceRecorder, SetupError> {
    let (out, path): (Box<dyn Write>, PathBuf) = match target {
        TraceTarget::Stdout => (Box::new(io::stdout()), PathBuf::from("-")),
        TraceTarget::File(path) => {
            let file = File::create(path).map_err(|source| SetupError::TraceOpen {
                path: path.clone(),
                source,
            })?;
            (Box::new(BufWriter::new(file)), path.clone())
        }
    };
    TraceRecorder::new(out, start).map_err(|source| SetupError::TraceOpen { path, source })
}

/// Writes the final status line for `summary`.
///
/// Failed runs always get a reproduction line; completed runs report their
/// cycle count only when verbose or asked to.
pub fn report(summary: &RunSummary, config: &SimConfig, out: &mut dyn Write) {
    let line = match summary.failure_line() {
        Some(line) => line,
        None if config.verbose || config.report_cycles => summary.completion_line(),
        None => return,
    };
    if let Err(err) = writeln!(out, "{line}") {
        log::warn!("could not write final status: {err}");
    }
}
