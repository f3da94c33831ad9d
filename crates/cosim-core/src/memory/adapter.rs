use super::{ChannelRequests, MemoryBackend};
use crate::{AddressRequest, MemPortBundle, WriteData};

/// Counters kept by a channel adapter over the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ChannelStats {
    /// Address-read handshakes completed.
    pub reads_accepted: u64,
    /// Address-write handshakes completed.
    pub writes_accepted: u64,
    /// Write-data beats accepted.
    pub beats_accepted: u64,
    /// Cycles on which the DUT retracted or altered an unaccepted request.
    pub protocol_violations: u64,
    /// Valid requests addressed below the memory base.
    pub below_base_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingBeat {
    data: Vec<u8>,
    strb: u64,
    last: bool,
}

impl PendingBeat {
    fn from_wire(w: &WriteData<'_>) -> Self {
        Self {
            data: w.data.to_vec(),
            strb: w.strb,
            last: w.last,
        }
    }

    fn same_as(&self, w: &WriteData<'_>) -> bool {
        w.valid && self.data == w.data && self.strb == w.strb && self.last == w.last
    }
}

/// Ready flags presented to the DUT in the current cycle's pre-phase.
#[derive(Debug, Clone, Copy, Default)]
struct PresentedReady {
    ar: bool,
    aw: bool,
    w: bool,
}

/// Tracks requests presented while the backend was not ready.
///
/// Once a request is valid it must stay valid and unchanged until the
/// backend accepts it.
#[derive(Debug, Clone, Default)]
struct HandshakeMonitor {
    ar: Option<AddressRequest>,
    aw: Option<AddressRequest>,
    w: Option<PendingBeat>,
}

impl HandshakeMonitor {
    fn violations(&self, ar: &AddressRequest, aw: &AddressRequest, w: &WriteData<'_>) -> u64 {
        let held = |pending: Option<&AddressRequest>, now: &AddressRequest| {
            pending.map_or(true, |p| now.valid && p == now)
        };
        let mut count = 0;
        if !held(self.ar.as_ref(), ar) {
            count += 1;
        }
        if !held(self.aw.as_ref(), aw) {
            count += 1;
        }
        if !self.w.as_ref().map_or(true, |p| p.same_as(w)) {
            count += 1;
        }
        count
    }

    fn record(
        &mut self,
        ready: PresentedReady,
        ar: &AddressRequest,
        aw: &AddressRequest,
        w: &WriteData<'_>,
    ) {
        self.ar = (ar.valid && !ready.ar).then_some(*ar);
        self.aw = (aw.valid && !ready.aw).then_some(*aw);
        self.w = (w.valid && !ready.w).then(|| PendingBeat::from_wire(w));
    }
}

/// Copies one memory channel's signals between the DUT and its backend.
///
/// [`drive_inputs`](Self::drive_inputs) runs before the combinational phase;
/// [`forward_requests`](Self::forward_requests) runs after it.
#[derive(Debug, Clone)]
pub struct MemoryChannelAdapter {
    channel: usize,
    base_address: u64,
    presented: PresentedReady,
    monitor: HandshakeMonitor,
    stats: ChannelStats,
}

impl MemoryChannelAdapter {
    /// Creates the adapter for `channel` of a memory region at `base_address`.
    #[must_use]
    pub fn new(channel: usize, base_address: u64) -> Self {
        Self {
            channel,
            base_address,
            presented: PresentedReady::default(),
            monitor: HandshakeMonitor::default(),
            stats: ChannelStats::default(),
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Drives the backend's current readiness and responses onto DUT inputs.
    pub fn drive_inputs<P>(&mut self, backend: &dyn MemoryBackend, ports: &mut P)
    where
        P: MemPortBundle + ?Sized,
    {
        let ch = self.channel;
        self.presented = PresentedReady {
            ar: backend.ar_ready(),
            aw: backend.aw_ready(),
            w: backend.w_ready(),
        };
        ports.set_ar_ready(ch, self.presented.ar);
        ports.set_aw_ready(ch, self.presented.aw);
        ports.set_w_ready(ch, self.presented.w);
        ports.set_b(ch, backend.write_response());
        ports.set_r(ch, backend.read_response());
    }

    /// Samples the DUT's request outputs and ticks the backend with them.
    pub fn forward_requests<P>(&mut self, ports: &P, backend: &mut dyn MemoryBackend)
    where
        P: MemPortBundle + ?Sized,
    {
        let ch = self.channel;
        let ar = ports.ar(ch);
        let aw = ports.aw(ch);
        let w = ports.w(ch);

        let violations = self.monitor.violations(&ar, &aw, &w);
        if violations > 0 {
            log::warn!("channel {ch}: DUT changed {violations} request(s) before acceptance");
            self.stats.protocol_violations += violations;
        }

        let requests = ChannelRequests {
            ar: self.translate(ar),
            aw: self.translate(aw),
            w,
            r_ready: ports.r_ready(ch),
            b_ready: ports.b_ready(ch),
        };
        backend.tick(&requests);

        self.stats.reads_accepted += u64::from(ar.valid && self.presented.ar);
        self.stats.writes_accepted += u64::from(aw.valid && self.presented.aw);
        self.stats.beats_accepted += u64::from(w.valid && self.presented.w);
        self.monitor.record(self.presented, &ar, &aw, &w);
    }

    fn translate(&mut self, mut request: AddressRequest) -> AddressRequest {
        if request.valid && request.addr < self.base_address {
            if self.stats.below_base_requests == 0 {
                log::warn!(
                    "channel {}: request to {:#x} is below memory base {:#x}",
                    self.channel,
                    request.addr,
                    self.base_address
                );
            }
            self.stats.below_base_requests += 1;
        }
        request.addr = request.addr.wrapping_sub(self.base_address);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryChannelAdapter;
    use crate::memory::{ChannelRequests, MemoryBackend};
    use crate::{AddressRequest, MemPortBundle, ReadResponse, WriteData, WriteResponse};

    const BASE: u64 = 0x8000_0000;

    #[derive(Default)]
    struct Ports {
        ar_ready: bool,
        aw_ready: bool,
        w_ready: bool,
        b: WriteResponse,
        r_valid: bool,
        r_data: Vec<u8>,
        ar: AddressRequest,
        aw: AddressRequest,
        w_valid: bool,
        w_data: Vec<u8>,
        r_ready: bool,
        b_ready: bool,
    }

    impl MemPortBundle for Ports {
        fn set_ar_ready(&mut self, _channel: usize, ready: bool) {
            self.ar_ready = ready;
        }
        fn set_aw_ready(&mut self, _channel: usize, ready: bool) {
            self.aw_ready = ready;
        }
        fn set_w_ready(&mut self, _channel: usize, ready: bool) {
            self.w_ready = ready;
        }
        fn set_b(&mut self, _channel: usize, response: WriteResponse) {
            self.b = response;
        }
        fn set_r(&mut self, _channel: usize, response: ReadResponse<'_>) {
            self.r_valid = response.valid;
            self.r_data = response.data.to_vec();
        }
        fn ar(&self, _channel: usize) -> AddressRequest {
            self.ar
        }
        fn aw(&self, _channel: usize) -> AddressRequest {
            self.aw
        }
        fn w(&self, _channel: usize) -> WriteData<'_> {
            WriteData {
                valid: self.w_valid,
                data: &self.w_data,
                strb: 0xFF,
                last: true,
            }
        }
        fn r_ready(&self, _channel: usize) -> bool {
            self.r_ready
        }
        fn b_ready(&self, _channel: usize) -> bool {
            self.b_ready
        }
    }

    /// Backend that is busy for a fixed number of cycles and records ticks.
    #[derive(Default)]
    struct SlowBackend {
        busy_cycles: u32,
        ticks: Vec<(AddressRequest, bool)>,
        accepted: Vec<AddressRequest>,
        storage: Vec<u8>,
    }

    impl MemoryBackend for SlowBackend {
        fn ar_ready(&self) -> bool {
            self.busy_cycles == 0
        }
        fn aw_ready(&self) -> bool {
            false
        }
        fn w_ready(&self) -> bool {
            false
        }
        fn write_response(&self) -> WriteResponse {
            WriteResponse {
                valid: true,
                resp: 0,
                id: 9,
            }
        }
        fn read_response(&self) -> ReadResponse<'_> {
            ReadResponse::default()
        }
        fn tick(&mut self, requests: &ChannelRequests<'_>) {
            let ready = self.ar_ready();
            self.ticks.push((requests.ar, ready));
            if requests.ar.valid && ready {
                self.accepted.push(requests.ar);
            }
            self.busy_cycles = self.busy_cycles.saturating_sub(1);
        }
        fn data(&self) -> &[u8] {
            &self.storage
        }
        fn data_mut(&mut self) -> &mut [u8] {
            &mut self.storage
        }
    }

    fn read(addr: u64) -> AddressRequest {
        AddressRequest {
            valid: true,
            addr,
            id: 3,
            size: 3,
            len: 0,
        }
    }

    fn cycle(adapter: &mut MemoryChannelAdapter, backend: &mut SlowBackend, ports: &mut Ports) {
        adapter.drive_inputs(&*backend, ports);
        adapter.forward_requests(&*ports, backend);
    }

    #[test]
    fn drive_inputs_mirrors_backend_state() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let backend = SlowBackend::default();
        let mut ports = Ports::default();

        adapter.drive_inputs(&backend, &mut ports);

        assert!(ports.ar_ready);
        assert!(!ports.aw_ready);
        assert!(!ports.w_ready);
        assert_eq!(ports.b.id, 9);
        assert!(!ports.r_valid);
        assert!(ports.r_data.is_empty());
    }

    #[test]
    fn forwarded_addresses_are_relative_to_base() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let mut backend = SlowBackend::default();
        let mut ports = Ports {
            ar: read(BASE + 0x40),
            ..Ports::default()
        };

        cycle(&mut adapter, &mut backend, &mut ports);

        assert_eq!(backend.accepted.len(), 1);
        assert_eq!(backend.accepted[0].addr, 0x40);
        assert_eq!(adapter.stats().reads_accepted, 1);
        assert_eq!(adapter.stats().below_base_requests, 0);
    }

    #[test]
    fn held_request_is_accepted_exactly_once() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let mut backend = SlowBackend {
            busy_cycles: 3,
            ..SlowBackend::default()
        };
        let mut ports = Ports {
            ar: read(BASE + 0x80),
            ..Ports::default()
        };

        for _ in 0..3 {
            cycle(&mut adapter, &mut backend, &mut ports);
            assert!(!ports.ar_ready);
        }
        cycle(&mut adapter, &mut backend, &mut ports);
        assert!(ports.ar_ready);
        ports.ar.valid = false;
        cycle(&mut adapter, &mut backend, &mut ports);

        assert_eq!(backend.accepted, vec![read(0x80)]);
        assert!(backend.ticks[..4].iter().all(|(req, _)| *req == read(0x80)));
        assert_eq!(adapter.stats().reads_accepted, 1);
        assert_eq!(adapter.stats().protocol_violations, 0);
    }

    #[test]
    fn retracting_an_unaccepted_request_is_flagged() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let mut backend = SlowBackend {
            busy_cycles: 5,
            ..SlowBackend::default()
        };
        let mut ports = Ports {
            ar: read(BASE),
            ..Ports::default()
        };

        cycle(&mut adapter, &mut backend, &mut ports);
        ports.ar.addr += 8;
        cycle(&mut adapter, &mut backend, &mut ports);
        ports.ar.valid = false;
        cycle(&mut adapter, &mut backend, &mut ports);

        assert_eq!(adapter.stats().protocol_violations, 2);
        assert!(backend.accepted.is_empty());
    }

    #[test]
    fn write_beat_waiting_for_ready_is_tracked() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let mut backend = SlowBackend::default();
        let mut ports = Ports {
            w_valid: true,
            w_data: vec![1; 8],
            ..Ports::default()
        };

        cycle(&mut adapter, &mut backend, &mut ports);
        ports.w_data = vec![2; 8];
        cycle(&mut adapter, &mut backend, &mut ports);

        assert_eq!(adapter.stats().protocol_violations, 1);
        assert_eq!(adapter.stats().beats_accepted, 0);
    }

    #[test]
    fn requests_below_base_are_counted() {
        let mut adapter = MemoryChannelAdapter::new(0, BASE);
        let mut backend = SlowBackend::default();
        let mut ports = Ports {
            ar: read(0x100),
            ..Ports::default()
        };

        cycle(&mut adapter, &mut backend, &mut ports);

        assert_eq!(adapter.stats().below_base_requests, 1);
        assert_eq!(backend.accepted[0].addr, 0x100u64.wrapping_sub(BASE));
    }
}
