//! Cycle-accurate co-simulation core.
//!
//! Steps a two-phase clocked hardware model one cycle at a time, bridging
//! its memory channels to backend models and its host link to a transport,
//! while watching the retiring instruction stream for benchmark markers.

/// Hardware-model and port-bundle contracts.
pub mod api;
pub use api::{
    AddressRequest, Dut, HostPortBundle, Instruction, MemPortBundle, MemoryGeometry,
    ReadResponse, WriteData, WriteResponse,
};

/// Setup and evaluation error taxonomy.
pub mod fault;
pub use fault::{EvalError, SetupError, SETUP_FAILURE_EXIT_CODE};

/// Benchmark marker detection.
pub mod magic;
pub use magic::{MagicPatternDetector, PatternWindow, MAGIC_LEN, MAGIC_START, MAGIC_STOP};

/// Memory backends and channel adapters.
pub mod memory;
pub use memory::{
    allocate_channels, mib_to_bytes, BackendFactory, BackendKind, ChannelRequests, ChannelStats,
    MagicBackendFactory, MagicMemory, MemoryBackend, MemoryChannelAdapter, MIB,
};

/// Host transport bridge and cancellation.
pub mod htif;
pub use htif::{BridgeStats, HostTransport, HostTransportBridge, StopToken, MAX_FRAME_BYTES};

/// VCD trace recording.
pub mod trace;
pub use trace::{records_cycle, write_header, TraceRecorder, DISASM_FIELD_CHARS};

/// Cycle counter and termination bookkeeping.
pub mod state;
pub use state::run_state::{
    EVALUATION_FAILURE_EXIT_CODE, SUCCESS_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
pub use state::{CycleCounter, RunSummary, TerminationCause};

/// Orchestration loop.
pub mod sim;
pub use sim::{LoopConfig, RunContext, SimulationLoop, MAX_RESET_CYCLES, RESET_HOST_EDGES};
