//! Host/target interface bridge.
//!
//! The DUT exchanges fixed-width frames with the host on cycles where its
//! host clock has an edge. Inbound frames use a valid/ready handshake with
//! a single buffered frame; outbound frames are always accepted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{HostPortBundle, SetupError};

/// Widest host frame the bridge can buffer.
pub const MAX_FRAME_BYTES: usize = 8;

/// Byte-oriented host link driven by the bridge.
pub trait HostTransport {
    /// Fills `buf` with the next inbound frame if one is available.
    ///
    /// Must not block. Returns `false` when no frame is available, in which
    /// case `buf` is left untouched.
    fn recv_nonblocking(&mut self, buf: &mut [u8]) -> bool;

    /// Sends an outbound frame.
    fn send(&mut self, buf: &[u8]);

    /// Returns `true` once the host side has finished.
    fn done(&self) -> bool;

    /// Exit status reported by the host side (`0` on success).
    fn exit_code(&self) -> i32;

    /// Asks the host side to shut down.
    fn stop(&mut self);
}

/// Cooperative cancellation flag shared with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the run stop at the next cycle boundary.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters kept by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BridgeStats {
    /// Cycles on which the host clock had an edge.
    pub gated_cycles: u64,
    /// Inbound frames fetched from the transport.
    pub frames_received: u64,
    /// Outbound frames forwarded to the transport.
    pub frames_sent: u64,
}

/// Single-slot handshake between the DUT's host ports and a transport.
#[derive(Debug, Clone)]
pub struct HostTransportBridge {
    frame_bytes: usize,
    pending: bool,
    buffered: u64,
    stop: StopToken,
    stop_forwarded: bool,
    stats: BridgeStats,
}

impl HostTransportBridge {
    /// Creates a bridge for frames of `width_bits`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::HostWidth`] unless the width is a non-zero whole
    /// number of bytes no wider than [`MAX_FRAME_BYTES`].
    pub fn new(width_bits: u32, stop: StopToken) -> Result<Self, SetupError> {
        let frame_bytes = usize::try_from(width_bits / 8).unwrap_or(usize::MAX);
        if width_bits == 0 || width_bits % 8 != 0 || frame_bytes > MAX_FRAME_BYTES {
            return Err(SetupError::HostWidth { bits: width_bits });
        }
        Ok(Self {
            frame_bytes,
            pending: false,
            buffered: 0,
            stop,
            stop_forwarded: false,
            stats: BridgeStats::default(),
        })
    }

    /// Frame width in bytes.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Inbound frame currently presented to the DUT, if any.
    #[must_use]
    pub const fn pending_frame(&self) -> Option<u64> {
        if self.pending {
            Some(self.buffered)
        } else {
            None
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Holds both host handshakes idle, used while the DUT is in reset.
    pub fn drive_idle<P: HostPortBundle + ?Sized>(ports: &mut P) {
        ports.set_host_in(false, 0);
        ports.set_host_out_ready(false);
    }

    /// Performs one cycle of host exchange; a no-op without a host clock edge.
    ///
    /// A new inbound frame is fetched only when the DUT accepted the
    /// presented one or nothing is presented, so a frame is never dropped
    /// or fetched twice.
    pub fn exchange<P, T>(&mut self, ports: &mut P, transport: &mut T)
    where
        P: HostPortBundle + ?Sized,
        T: HostTransport + ?Sized,
    {
        if !ports.host_clk_edge() {
            return;
        }
        self.stats.gated_cycles += 1;

        if ports.host_in_ready() || !self.pending {
            let mut buf = [0u8; MAX_FRAME_BYTES];
            self.pending = transport.recv_nonblocking(&mut buf[..self.frame_bytes]);
            if self.pending {
                self.buffered = u64::from_le_bytes(buf);
                self.stats.frames_received += 1;
                log::trace!("host -> target {:#018x}", self.buffered);
            }
        }
        ports.set_host_in(self.pending, self.buffered);

        if ports.host_out_valid() {
            let bits = ports.host_out_bits();
            log::trace!("target -> host {bits:#018x}");
            transport.send(&bits.to_le_bytes()[..self.frame_bytes]);
            self.stats.frames_sent += 1;
        }
        ports.set_host_out_ready(true);
    }

    /// Forwards a pending stop request once, then reports transport completion.
    pub fn transport_done<T: HostTransport + ?Sized>(&mut self, transport: &mut T) -> bool {
        if !self.stop_forwarded && self.stop.is_stop_requested() {
            log::info!("stop requested, asking host transport to finish");
            transport.stop();
            self.stop_forwarded = true;
        }
        transport.done()
    }
}
