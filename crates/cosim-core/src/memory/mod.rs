//! Memory channel plumbing between the DUT and its backend models.

/// Per-channel signal exchange between DUT ports and a backend.
pub mod adapter;
/// Hex memory image preloading.
pub mod image;
/// Zero-latency functional backend.
pub mod zero_latency;

pub use adapter::{ChannelStats, MemoryChannelAdapter};
pub use image::{load_image, load_image_file};
pub use zero_latency::MagicMemory;

use crate::{AddressRequest, MemoryGeometry, ReadResponse, SetupError, WriteData, WriteResponse};

/// Bytes per MiB, the unit of the configured memory size.
pub const MIB: u64 = 1 << 20;

/// Request-side signals of one channel for one cycle, after address translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelRequests<'a> {
    /// Address-read request.
    pub ar: AddressRequest,
    /// Address-write request.
    pub aw: AddressRequest,
    /// Write-data beat.
    pub w: WriteData<'a>,
    /// DUT accepts the presented read beat.
    pub r_ready: bool,
    /// DUT accepts the presented write response.
    pub b_ready: bool,
}

/// Per-channel memory model advanced once per simulated cycle.
///
/// Readiness and response accessors describe the state to present to the
/// DUT this cycle; [`MemoryBackend::tick`] consumes the DUT's requests and
/// produces the state for the next cycle.
pub trait MemoryBackend {
    /// Address-read channel is ready to accept a request.
    fn ar_ready(&self) -> bool;

    /// Address-write channel is ready to accept a request.
    fn aw_ready(&self) -> bool;

    /// Write-data channel is ready to accept a beat.
    fn w_ready(&self) -> bool;

    /// Write response presented this cycle.
    fn write_response(&self) -> WriteResponse;

    /// Read beat presented this cycle.
    fn read_response(&self) -> ReadResponse<'_>;

    /// Advances the model by one cycle.
    fn tick(&mut self, requests: &ChannelRequests<'_>);

    /// Raw backing storage.
    fn data(&self) -> &[u8];

    /// Raw backing storage, for preloading.
    fn data_mut(&mut self) -> &mut [u8];
}

/// Backend implementation selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BackendKind {
    /// Zero-latency functional model.
    #[default]
    Magic,
    /// Timing-accurate DRAM model.
    Timing,
}

/// Constructs one backend per memory channel.
pub trait BackendFactory {
    /// Creates a backend of `kind` with `size_bytes` of storage.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Allocation`] when the storage cannot be
    /// allocated, or [`SetupError::TimingModelUnavailable`] when the factory
    /// does not provide `kind`.
    fn create(
        &self,
        kind: BackendKind,
        size_bytes: u64,
        geometry: &MemoryGeometry,
    ) -> Result<Box<dyn MemoryBackend>, SetupError>;
}

/// Factory providing only the zero-latency backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicBackendFactory;

impl BackendFactory for MagicBackendFactory {
    fn create(
        &self,
        kind: BackendKind,
        size_bytes: u64,
        geometry: &MemoryGeometry,
    ) -> Result<Box<dyn MemoryBackend>, SetupError> {
        match kind {
            BackendKind::Magic => Ok(Box::new(MagicMemory::allocate(
                size_bytes,
                geometry.beat_bytes,
            )?)),
            BackendKind::Timing => Err(SetupError::TimingModelUnavailable),
        }
    }
}

/// Allocates `total_bytes` of memory split evenly across the DUT's channels.
///
/// # Errors
///
/// Propagates factory failures; allocation failures report the total
/// requested size rather than the per-channel share.
pub fn allocate_channels(
    factory: &dyn BackendFactory,
    kind: BackendKind,
    total_bytes: u64,
    geometry: &MemoryGeometry,
) -> Result<Vec<Box<dyn MemoryBackend>>, SetupError> {
    if geometry.channels == 0 {
        return Ok(Vec::new());
    }
    let per_channel = total_bytes / geometry.channels as u64;
    let backends = (0..geometry.channels)
        .map(|_| factory.create(kind, per_channel, geometry))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| match err {
            SetupError::Allocation { .. } => SetupError::Allocation {
                bytes: total_bytes,
                mib: total_bytes / MIB,
            },
            other => other,
        })?;
    log::debug!(
        "allocated {} {:?} backend(s) of {} bytes",
        backends.len(),
        kind,
        per_channel
    );
    Ok(backends)
}

/// Converts a size in MiB to bytes.
///
/// # Errors
///
/// Returns [`SetupError::Allocation`] when the byte count overflows.
pub fn mib_to_bytes(mib: u64) -> Result<u64, SetupError> {
    mib.checked_mul(MIB).ok_or(SetupError::Allocation {
        bytes: u64::MAX,
        mib,
    })
}
