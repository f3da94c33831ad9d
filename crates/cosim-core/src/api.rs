//! Contracts between the simulation loop and the generated hardware model.
//!
//! The loop never touches generated wiring directly. A generated model
//! implements [`Dut`] once, exposing its memory channels through
//! [`MemPortBundle`] and its host link through [`HostPortBundle`].

use std::io::{self, Write};

use crate::EvalError;

/// Raw instruction encoding the DUT reports as currently retiring.
pub type Instruction = u32;

/// Address-channel request (address-read or address-write) driven by the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressRequest {
    /// Request valid flag, owned by the DUT.
    pub valid: bool,
    /// Byte address of the first beat.
    pub addr: u64,
    /// Transaction id echoed back in the response.
    pub id: u64,
    /// Log2 of bytes per beat.
    pub size: u8,
    /// Burst length minus one.
    pub len: u8,
}

/// Write-data beat driven by the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteData<'a> {
    /// Beat valid flag, owned by the DUT.
    pub valid: bool,
    /// Beat payload, one full data-bus width.
    pub data: &'a [u8],
    /// Byte strobe, bit `i` enables byte `i` of `data`.
    pub strb: u64,
    /// Last beat of the burst.
    pub last: bool,
}

/// Write-response state presented to the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WriteResponse {
    /// Response valid flag, owned by the backend.
    pub valid: bool,
    /// Response code (`0` is OKAY).
    pub resp: u8,
    /// Transaction id of the completed write.
    pub id: u64,
}

/// Read-data beat presented to the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadResponse<'a> {
    /// Beat valid flag, owned by the backend.
    pub valid: bool,
    /// Response code (`0` is OKAY).
    pub resp: u8,
    /// Transaction id of the read burst.
    pub id: u64,
    /// Beat payload, one full data-bus width.
    pub data: &'a [u8],
    /// Last beat of the burst.
    pub last: bool,
}

/// Static shape of the DUT's memory system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryGeometry {
    /// Number of independent memory channels.
    pub channels: usize,
    /// Base address of the memory region in the DUT's address map.
    pub base_address: u64,
    /// Total backing size used when no size is configured.
    pub default_size_bytes: u64,
    /// Width of the data bus in bytes.
    pub beat_bytes: usize,
    /// Cache-line size in bytes; channel interleaving granularity.
    pub line_bytes: usize,
}

/// Named per-channel, per-direction access to the DUT's memory ports.
///
/// Setters drive DUT inputs, getters sample DUT outputs. `channel` is always
/// below [`MemoryGeometry::channels`].
pub trait MemPortBundle {
    /// Drives the address-read ready input.
    fn set_ar_ready(&mut self, channel: usize, ready: bool);

    /// Drives the address-write ready input.
    fn set_aw_ready(&mut self, channel: usize, ready: bool);

    /// Drives the write-data ready input.
    fn set_w_ready(&mut self, channel: usize, ready: bool);

    /// Drives the write-response channel inputs.
    fn set_b(&mut self, channel: usize, response: WriteResponse);

    /// Drives the read-data channel inputs.
    fn set_r(&mut self, channel: usize, response: ReadResponse<'_>);

    /// Samples the address-read request outputs.
    fn ar(&self, channel: usize) -> AddressRequest;

    /// Samples the address-write request outputs.
    fn aw(&self, channel: usize) -> AddressRequest;

    /// Samples the write-data outputs.
    fn w(&self, channel: usize) -> WriteData<'_>;

    /// Samples the read-data ready output.
    fn r_ready(&self, channel: usize) -> bool;

    /// Samples the write-response ready output.
    fn b_ready(&self, channel: usize) -> bool;
}

/// Access to the DUT's host/target link ports.
pub trait HostPortBundle {
    /// Returns `true` on cycles where the host clock has an edge.
    fn host_clk_edge(&self) -> bool;

    /// Returns `true` when the DUT accepts the presented inbound frame.
    fn host_in_ready(&self) -> bool;

    /// Drives the inbound frame valid flag and payload.
    fn set_host_in(&mut self, valid: bool, bits: u64);

    /// Returns `true` when the DUT presents an outbound frame.
    fn host_out_valid(&self) -> bool;

    /// Samples the outbound frame payload.
    fn host_out_bits(&self) -> u64;

    /// Drives the outbound ready input.
    fn set_host_out_ready(&mut self, ready: bool);

    /// Width of a host frame in bits.
    fn host_width_bits(&self) -> u32;
}

/// Two-phase clocked hardware model.
pub trait Dut: MemPortBundle + HostPortBundle {
    /// Seeds the model's pseudo-random register initialisation.
    fn init(&mut self, seed: u32);

    /// Describes the model's memory channels.
    fn memory_geometry(&self) -> MemoryGeometry;

    /// Combinational settle phase.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] when the model detects an internal
    /// inconsistency (for example a failed assertion).
    fn clock_lo(&mut self, reset: bool) -> Result<(), EvalError>;

    /// Sequential commit phase.
    fn clock_hi(&mut self, reset: bool);

    /// Instruction currently retiring.
    fn current_instruction(&self) -> Instruction;

    /// Writes the per-cycle trace record for `cycle`.
    ///
    /// # Errors
    ///
    /// Propagates write failures of `out`.
    fn dump(&mut self, out: &mut dyn Write, cycle: u64) -> io::Result<()>;

    /// Writes a human-readable dump of the model state.
    ///
    /// # Errors
    ///
    /// Propagates write failures of `out`.
    fn print(&self, out: &mut dyn Write) -> io::Result<()>;
}
