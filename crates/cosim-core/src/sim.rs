//! Cycle-stepped orchestration of the DUT and its collaborators.
//!
//! Every iteration follows the same order:
//! 1. drive memory responses onto DUT inputs
//! 2. combinational phase (`clock_lo`)
//! 3. tick memory backends with the DUT's requests
//! 4. host transport exchange
//! 5. optional diagnostic print
//! 6. marker detection and counter reset/report
//! 7. trace record
//! 8. sequential phase (`clock_hi`)
//! 9. counter increment
//!
//! A failed combinational phase caps the budget at the current cycle, so the
//! run winds down after finishing the iteration.

use std::io::{self, Write};

use crate::memory::{MemoryBackend, MemoryChannelAdapter};
use crate::state::CycleCounter;
use crate::{
    Dut, EvalError, HostTransport, HostTransportBridge, MagicPatternDetector, RunSummary,
    SetupError, StopToken, TerminationCause, TraceRecorder,
};

/// Host clock edges observed under reset before cycle zero.
pub const RESET_HOST_EDGES: usize = 3;

/// Reset cycles allowed for the host clock edges to appear.
pub const MAX_RESET_CYCLES: u64 = 1 << 20;

/// Loop parameters fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LoopConfig {
    /// Cycle budget; reaching it without completion is a timeout.
    pub max_cycles: u64,
    /// First cycle after zero that is traced and, when verbose, printed.
    pub trace_start: u64,
    /// Print DUT state every eligible cycle.
    pub verbose: bool,
    /// Seed the DUT was initialised with, for reproduction lines.
    pub seed: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: u64::MAX,
            trace_start: 0,
            verbose: false,
            seed: 0,
        }
    }
}

/// State owned by the loop for the duration of a run.
pub struct RunContext<D, T> {
    config: LoopConfig,
    budget: u64,
    counter: CycleCounter,
    counter_resets: u64,
    benchmark_cycles: Vec<u64>,
    eval_failure: Option<EvalError>,
    dut: D,
    transport: T,
    backends: Vec<Box<dyn MemoryBackend>>,
}

impl<D, T> RunContext<D, T> {
    /// Bundles the collaborators of one run.
    #[must_use]
    pub fn new(
        config: LoopConfig,
        dut: D,
        transport: T,
        backends: Vec<Box<dyn MemoryBackend>>,
    ) -> Self {
        Self {
            config,
            budget: config.max_cycles,
            counter: CycleCounter::new(),
            counter_resets: 0,
            benchmark_cycles: Vec::new(),
            eval_failure: None,
            dut,
            transport,
            backends,
        }
    }

    /// Current cycle count.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.counter.get()
    }

    /// Effective cycle budget, lowered on evaluation failure.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Evaluation failure recorded this run, if any.
    #[must_use]
    pub const fn eval_failure(&self) -> Option<&EvalError> {
        self.eval_failure.as_ref()
    }
}

/// Drives a DUT cycle by cycle against its memory backends and host link.
pub struct SimulationLoop<D, T> {
    ctx: RunContext<D, T>,
    adapters: Vec<MemoryChannelAdapter>,
    bridge: HostTransportBridge,
    detector: MagicPatternDetector,
    trace: Option<TraceRecorder>,
    notices: Box<dyn Write>,
    diagnostics: Box<dyn Write>,
}

impl<D: Dut, T: HostTransport> SimulationLoop<D, T> {
    /// Wires the loop around `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ChannelMismatch`] when the backend count differs
    /// from the DUT's channel count, or [`SetupError::HostWidth`] when the
    /// DUT's host frame width is unsupported.
    pub fn new(ctx: RunContext<D, T>, stop: StopToken) -> Result<Self, SetupError> {
        let geometry = ctx.dut.memory_geometry();
        if ctx.backends.len() != geometry.channels {
            return Err(SetupError::ChannelMismatch {
                expected: geometry.channels,
                actual: ctx.backends.len(),
            });
        }
        let bridge = HostTransportBridge::new(ctx.dut.host_width_bits(), stop)?;
        let adapters = (0..geometry.channels)
            .map(|channel| MemoryChannelAdapter::new(channel, geometry.base_address))
            .collect();

        Ok(Self {
            ctx,
            adapters,
            bridge,
            detector: MagicPatternDetector::new(),
            trace: None,
            notices: Box::new(io::stdout()),
            diagnostics: Box::new(io::stderr()),
        })
    }

    /// Enables trace recording.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceRecorder) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Redirects benchmark notices (stdout by default).
    #[must_use]
    pub fn with_notice_sink(mut self, sink: Box<dyn Write>) -> Self {
        self.notices = sink;
        self
    }

    /// Redirects DUT diagnostic prints and evaluation errors (stderr by default).
    #[must_use]
    pub fn with_diagnostic_sink(mut self, sink: Box<dyn Write>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Run state.
    #[must_use]
    pub const fn context(&self) -> &RunContext<D, T> {
        &self.ctx
    }

    /// The hardware model.
    #[must_use]
    pub const fn dut(&self) -> &D {
        &self.ctx.dut
    }

    /// The host transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.ctx.transport
    }

    /// The memory backends, indexed by channel.
    #[must_use]
    pub fn backends(&self) -> &[Box<dyn MemoryBackend>] {
        &self.ctx.backends
    }

    /// Holds the DUT in reset until [`RESET_HOST_EDGES`] host clock edges
    /// have passed, so pipelined reset completes before cycle zero.
    ///
    /// Returns the number of reset cycles clocked.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ResetEvaluation`] if the DUT fails to evaluate,
    /// or [`SetupError::ResetTimeout`] if the edges never appear.
    pub fn reset(&mut self) -> Result<u64, SetupError> {
        let dut = &mut self.ctx.dut;
        HostTransportBridge::drive_idle(dut);

        let mut edges = 0;
        let mut cycles = 0;
        while edges < RESET_HOST_EDGES {
            if cycles == MAX_RESET_CYCLES {
                return Err(SetupError::ResetTimeout { cycles });
            }
            dut.clock_lo(true).map_err(SetupError::ResetEvaluation)?;
            dut.clock_hi(true);
            cycles += 1;
            edges += usize::from(dut.host_clk_edge());
        }
        log::debug!("reset released after {cycles} cycles");
        Ok(cycles)
    }

    /// Returns `true` while no termination condition holds.
    pub fn should_continue(&mut self) -> bool {
        self.ctx.eval_failure.is_none()
            && self.ctx.counter.get() < self.ctx.budget
            && !self.bridge.transport_done(&mut self.ctx.transport)
    }

    /// Simulates one cycle.
    pub fn step(&mut self) {
        let cycle = self.ctx.counter.get();

        for (adapter, backend) in self.adapters.iter_mut().zip(&self.ctx.backends) {
            adapter.drive_inputs(backend.as_ref(), &mut self.ctx.dut);
        }

        let consistent = match self.ctx.dut.clock_lo(false) {
            Ok(()) => true,
            Err(err) => {
                self.record_eval_failure(cycle, err);
                false
            }
        };

        if consistent {
            for (adapter, backend) in self.adapters.iter_mut().zip(&mut self.ctx.backends) {
                adapter.forward_requests(&self.ctx.dut, backend.as_mut());
            }
            self.bridge
                .exchange(&mut self.ctx.dut, &mut self.ctx.transport);
        }

        if self.ctx.config.verbose && cycle >= self.ctx.config.trace_start {
            if let Err(err) = self.ctx.dut.print(self.diagnostics.as_mut()) {
                log::warn!("diagnostic print failed: {err}");
            }
        }

        if consistent {
            self.observe_markers();
        }

        self.record_trace();
        self.ctx.dut.clock_hi(false);
        self.ctx.counter.increment();
    }

    /// Steps until a termination condition holds and summarises the run.
    pub fn run(&mut self) -> RunSummary {
        while self.should_continue() {
            self.step();
        }
        let trace_records = self.trace.as_ref().map_or(0, TraceRecorder::records);
        if let Some(trace) = self.trace.take() {
            if let Err(err) = trace.finish() {
                log::error!("failed to flush trace output: {err}");
            }
        }
        if let Err(err) = self.notices.flush() {
            log::warn!("failed to flush benchmark notices: {err}");
        }

        let summary = RunSummary {
            cause: self.termination_cause(),
            cycles: self.ctx.counter.get(),
            seed: self.ctx.config.seed,
            benchmark_cycles: self.ctx.benchmark_cycles.clone(),
            counter_resets: self.ctx.counter_resets,
            eval_error: self
                .ctx
                .eval_failure
                .as_ref()
                .map(|err| err.message().to_owned()),
            channels: self.adapters.iter().map(MemoryChannelAdapter::stats).collect(),
            host: self.bridge.stats(),
            trace_records,
        };
        log::info!(
            "run finished: {} after {} cycles",
            summary.cause,
            summary.cycles
        );
        summary
    }

    fn termination_cause(&mut self) -> TerminationCause {
        let code = self.ctx.transport.exit_code();
        if code != 0 {
            TerminationCause::TransportFailure { code }
        } else if self.ctx.eval_failure.is_some() {
            TerminationCause::EvaluationFailure
        } else if self.bridge.transport_done(&mut self.ctx.transport) {
            TerminationCause::Completed
        } else {
            TerminationCause::Timeout
        }
    }

    fn record_eval_failure(&mut self, cycle: u64, err: EvalError) {
        log::error!("DUT evaluation failed at cycle {cycle}: {err}");
        if let Err(write_err) = writeln!(self.diagnostics, "{err}") {
            log::warn!("failed to report evaluation error: {write_err}");
        }
        self.ctx.budget = cycle;
        self.ctx.eval_failure = Some(err);
    }

    fn observe_markers(&mut self) {
        self.detector.observe(self.ctx.dut.current_instruction());

        if self.detector.consume_start_event() {
            log::info!("start marker at cycle {}", self.ctx.counter.get());
            self.notice(format_args!("Emulator: resetting cycle count"));
            self.ctx.counter.reset();
            self.ctx.counter_resets += 1;
        }

        if self.detector.consume_stop_event() {
            let count = self.ctx.counter.get();
            log::info!("stop marker, benchmark took {count} cycles");
            self.notice(format_args!("Emulator: Cycle count is {count}"));
            self.ctx.benchmark_cycles.push(count);
        }
    }

    fn notice(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(err) = writeln!(self.notices, "{line}") {
            log::warn!("failed to write benchmark notice: {err}");
        }
    }

    fn record_trace(&mut self) {
        let Some(trace) = self.trace.as_mut() else {
            return;
        };
        if let Err(err) = trace.record(&mut self.ctx.dut, self.ctx.counter.get()) {
            log::error!("trace output failed, disabling trace: {err}");
            self.trace = None;
        }
    }
}
