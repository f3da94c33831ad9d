//! Per-cycle VCD trace recording.

use std::io::{self, Write};

use crate::Dut;

/// Width in characters of the write-back disassembly signal.
pub const DISASM_FIELD_CHARS: usize = 24;

/// Writes the VCD scope declaring the disassembly and cycle-counter signals.
///
/// # Errors
///
/// Propagates write failures of `out`.
pub fn write_header(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "$scope module Testbench $end")?;
    writeln!(
        out,
        "$var reg {} NDISASM_WB wb_instruction $end",
        DISASM_FIELD_CHARS * 8
    )?;
    writeln!(out, "$var reg 64 NCYCLE cycle $end")?;
    writeln!(out, "$upscope $end")
}

/// Returns `true` when `cycle` is recorded for a trace starting at `start`.
///
/// Cycle zero is always recorded so the initial state is present even when
/// recording starts later.
#[must_use]
pub const fn records_cycle(cycle: u64, start: u64) -> bool {
    cycle == 0 || cycle >= start
}

/// Trace sink receiving one DUT dump per recorded cycle.
pub struct TraceRecorder {
    out: Box<dyn Write>,
    start: u64,
    records: u64,
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("start", &self.start)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl TraceRecorder {
    /// Writes the header to `out` and returns a recorder starting at `start`.
    ///
    /// # Errors
    ///
    /// Propagates header write failures.
    pub fn new(mut out: Box<dyn Write>, start: u64) -> io::Result<Self> {
        write_header(out.as_mut())?;
        Ok(Self {
            out,
            start,
            records: 0,
        })
    }

    /// Number of cycles recorded.
    #[must_use]
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Dumps the DUT state for `cycle` if it falls in the recorded window.
    ///
    /// Returns whether a record was written.
    ///
    /// # Errors
    ///
    /// Propagates failures of the DUT dump or the sink.
    pub fn record<D: Dut + ?Sized>(&mut self, dut: &mut D, cycle: u64) -> io::Result<bool> {
        if !records_cycle(cycle, self.start) {
            return Ok(false);
        }
        dut.dump(self.out.as_mut(), cycle)?;
        self.records += 1;
        Ok(true)
    }

    /// Flushes buffered trace output.
    ///
    /// # Errors
    ///
    /// Propagates flush failures.
    pub fn finish(mut self) -> io::Result<()> {
        self.out.flush()
    }
}
