use std::collections::VecDeque;

use super::{ChannelRequests, MemoryBackend, MIB};
use crate::{ReadResponse, SetupError, WriteResponse};

/// Response code reported for every completed transaction.
const RESP_OKAY: u8 = 0;

#[derive(Debug, Clone)]
struct ReadBeat {
    id: u64,
    data: Vec<u8>,
    last: bool,
}

#[derive(Debug, Clone, Copy)]
struct WriteBurst {
    addr: u64,
    id: u64,
    beats_left: u32,
    beat_size: u64,
}

/// Functional memory that answers every request with no added latency.
///
/// Read bursts are expanded into beats the cycle they are accepted; writes
/// are accepted one burst at a time. Addresses wrap modulo the backing size,
/// and write beats are never wider than the data bus.
#[derive(Debug, Clone)]
pub struct MagicMemory {
    data: Vec<u8>,
    beat_bytes: usize,
    idle_beat: Vec<u8>,
    reads: VecDeque<ReadBeat>,
    write_acks: VecDeque<u64>,
    store: Option<WriteBurst>,
}

impl MagicMemory {
    /// Allocates `size_bytes` of zeroed storage with a `beat_bytes` data bus.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Allocation`] when the storage cannot be reserved.
    pub fn allocate(size_bytes: u64, beat_bytes: usize) -> Result<Self, SetupError> {
        let alloc_error = || SetupError::Allocation {
            bytes: size_bytes,
            mib: size_bytes / MIB,
        };
        let len = usize::try_from(size_bytes).map_err(|_| alloc_error())?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| alloc_error())?;
        data.resize(len, 0);

        Ok(Self {
            data,
            beat_bytes: beat_bytes.max(1),
            idle_beat: vec![0; beat_bytes.max(1)],
            reads: VecDeque::new(),
            write_acks: VecDeque::new(),
            store: None,
        })
    }

    /// Number of read beats waiting to be presented.
    #[must_use]
    pub fn pending_read_beats(&self) -> usize {
        self.reads.len()
    }

    fn wrap(&self, addr: u64) -> usize {
        if self.data.is_empty() {
            return 0;
        }
        // `len` fits in u64 and the remainder is below `len`.
        (addr % self.data.len() as u64) as usize
    }

    fn read_beat(&self, addr: u64) -> Vec<u8> {
        if self.data.is_empty() {
            return self.idle_beat.clone();
        }
        let base = self.wrap(addr);
        (0..self.beat_bytes)
            .map(|i| self.data[(base + i) % self.data.len()])
            .collect()
    }

    fn write_beat(&mut self, addr: u64, data: &[u8], strb: u64, size: u64) {
        if self.data.is_empty() {
            return;
        }
        let word = self.beat_bytes as u64;
        let size_mask = if size >= 64 { u64::MAX } else { (1 << size) - 1 };
        let mut strb = strb & size_mask.checked_shl((addr % word) as u32).unwrap_or(0);
        let base = self.wrap(addr / word * word);
        let len = self.data.len();
        for (i, byte) in data.iter().take(self.beat_bytes).enumerate() {
            if strb & 1 != 0 {
                self.data[(base + i) % len] = *byte;
            }
            strb >>= 1;
        }
    }
}

impl MemoryBackend for MagicMemory {
    fn ar_ready(&self) -> bool {
        true
    }

    fn aw_ready(&self) -> bool {
        self.store.is_none()
    }

    fn w_ready(&self) -> bool {
        self.store.is_some()
    }

    fn write_response(&self) -> WriteResponse {
        self.write_acks
            .front()
            .map_or_else(WriteResponse::default, |id| WriteResponse {
                valid: true,
                resp: RESP_OKAY,
                id: *id,
            })
    }

    fn read_response(&self) -> ReadResponse<'_> {
        self.reads.front().map_or(
            ReadResponse {
                data: &self.idle_beat,
                ..ReadResponse::default()
            },
            |beat| ReadResponse {
                valid: true,
                resp: RESP_OKAY,
                id: beat.id,
                data: &beat.data,
                last: beat.last,
            },
        )
    }

    fn tick(&mut self, requests: &ChannelRequests<'_>) {
        let ar_fire = requests.ar.valid && self.ar_ready();
        let aw_fire = requests.aw.valid && self.aw_ready();
        let w_fire = requests.w.valid && self.w_ready();
        let r_fire = requests.r_ready && !self.reads.is_empty();
        let b_fire = requests.b_ready && !self.write_acks.is_empty();

        if ar_fire {
            let word = self.beat_bytes as u64;
            let start = requests.ar.addr / word * word;
            let len = u64::from(requests.ar.len);
            for beat in 0..=len {
                let data = self.read_beat(start.wrapping_add(beat.wrapping_mul(word)));
                self.reads.push_back(ReadBeat {
                    id: requests.ar.id,
                    data,
                    last: beat == len,
                });
            }
        }

        if aw_fire {
            let size = u32::from(requests.aw.size).min(self.beat_bytes.trailing_zeros());
            self.store = Some(WriteBurst {
                addr: requests.aw.addr,
                id: requests.aw.id,
                beats_left: u32::from(requests.aw.len) + 1,
                beat_size: 1 << size,
            });
        }

        if w_fire {
            if let Some(mut burst) = self.store.take() {
                self.write_beat(burst.addr, requests.w.data, requests.w.strb, burst.beat_size);
                burst.addr = burst.addr.wrapping_add(burst.beat_size);
                burst.beats_left -= 1;
                if burst.beats_left == 0 {
                    if !requests.w.last {
                        log::warn!("write burst {} completed without last flag", burst.id);
                    }
                    self.write_acks.push_back(burst.id);
                } else {
                    self.store = Some(burst);
                }
            }
        }

        if b_fire {
            self.write_acks.pop_front();
        }
        if r_fire {
            self.reads.pop_front();
        }
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
