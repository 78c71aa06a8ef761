//! Virtual pulse generator
//!
//! Behaves like a pigpio daemon from the channel's point of view: segment
//! ids are small integers reused lowest-first, the segment table has a fixed
//! number of slots, and a submitted chain keeps the device busy for as long
//! as the chain would take to play.
//!
//! Segments survive a disconnect, as they do on the real daemon, so a
//! channel that forgets to release them shows up as `live_segments() > 0`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ir_tx::pigpio::PI_NO_WAVEFORM_ID;
use ir_tx::{ConnectionError, PulseDevice, TransmitError, TxError};
use ir_wave::{burst_micros, PulseBurst, SegmentHandle};
use tracing::{debug, info};

/// Segment slots on a stock pigpio daemon
pub const DEFAULT_SEGMENT_SLOTS: usize = 250;

/// Segment stored on the virtual device
#[derive(Debug, Clone, PartialEq)]
pub enum SimSegment {
    /// Pulses touching at least one line
    Carrier(Vec<PulseBurst>),
    /// Pure wait
    Silence(u32),
}

impl SimSegment {
    /// Playing time of the segment
    pub fn micros(&self) -> u64 {
        match self {
            SimSegment::Carrier(pulses) => burst_micros(pulses),
            SimSegment::Silence(us) => *us as u64,
        }
    }

    /// Number of carrier pulses
    pub fn pulse_count(&self) -> usize {
        match self {
            SimSegment::Carrier(pulses) => pulses.len(),
            SimSegment::Silence(_) => 0,
        }
    }
}

/// A chain the virtual device played
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    /// Handles in playback order
    pub handles: Vec<SegmentHandle>,
    /// Playing time of each chain entry
    pub micros: Vec<u64>,
    /// Carrier pulses over the whole chain
    pub carrier_pulses: usize,
}

impl Transmission {
    /// Playing time of the whole chain
    pub fn total_micros(&self) -> u64 {
        self.micros.iter().sum()
    }
}

#[derive(Debug)]
struct SimState {
    // Fault injection
    reachable: bool,
    held_elsewhere: bool,
    max_segments: usize,
    chain_fault: Option<i32>,
    stuck: bool,

    // Device state
    connected: bool,
    output_gpio: Option<u32>,
    segments: BTreeMap<u32, SimSegment>,
    busy_until: Option<Instant>,
    stuck_playing: bool,

    // Recorded activity (for test verification)
    connect_attempts: u32,
    connects: u32,
    disconnects: u32,
    registered: u64,
    deleted: u64,
    peak_segments: usize,
    halts: u32,
    transmissions: Vec<Transmission>,
}

impl SimState {
    fn new() -> Self {
        Self {
            reachable: true,
            held_elsewhere: false,
            max_segments: DEFAULT_SEGMENT_SLOTS,
            chain_fault: None,
            stuck: false,
            connected: false,
            output_gpio: None,
            segments: BTreeMap::new(),
            busy_until: None,
            stuck_playing: false,
            connect_attempts: 0,
            connects: 0,
            disconnects: 0,
            registered: 0,
            deleted: 0,
            peak_segments: 0,
            halts: 0,
            transmissions: Vec::new(),
        }
    }

    fn ensure_connected(&self) -> Result<(), TxError> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectionError::Io(std::io::ErrorKind::ConnectionReset.into()).into())
        }
    }

    fn store(&mut self, segment: SimSegment) -> Result<SegmentHandle, TxError> {
        self.ensure_connected()?;

        let id = (0..self.max_segments as u32)
            .find(|id| !self.segments.contains_key(id))
            .ok_or(TxError::Capacity {
                command: "WVCRE",
                code: PI_NO_WAVEFORM_ID,
            })?;

        self.segments.insert(id, segment);
        self.registered += 1;
        self.peak_segments = self.peak_segments.max(self.segments.len());
        Ok(SegmentHandle(id))
    }

    fn is_playing(&self) -> bool {
        self.stuck_playing || self.busy_until.is_some_and(|until| Instant::now() < until)
    }
}

/// Simulated pulse generator
pub struct VirtualPulseDevice {
    /// Identifier for logging
    id: String,
    state: Arc<Mutex<SimState>>,
}

impl VirtualPulseDevice {
    /// Create a reachable, empty device
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared view for assertions and fault injection
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PulseDevice for VirtualPulseDevice {
    fn describe(&self) -> String {
        format!("virtual:{}", self.id)
    }

    async fn connect(&mut self) -> Result<(), TxError> {
        let mut state = self.state();
        state.connect_attempts += 1;

        if !state.reachable {
            return Err(ConnectionError::Unreachable {
                endpoint: format!("virtual:{}", self.id),
                reason: "device offline".to_string(),
            }
            .into());
        }
        if state.held_elsewhere {
            return Err(ConnectionError::Busy(format!("virtual:{}", self.id)).into());
        }

        state.connected = true;
        state.connects += 1;
        debug!("Virtual device {} connected", self.id);
        Ok(())
    }

    async fn set_output(&mut self, gpio: u32) -> Result<(), TxError> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.output_gpio = Some(gpio);
        Ok(())
    }

    async fn add_waveform(&mut self, pulses: &[PulseBurst]) -> Result<SegmentHandle, TxError> {
        self.state().store(SimSegment::Carrier(pulses.to_vec()))
    }

    async fn add_silence(&mut self, duration_us: u32) -> Result<SegmentHandle, TxError> {
        self.state().store(SimSegment::Silence(duration_us))
    }

    async fn submit_chain(&mut self, handles: &[SegmentHandle]) -> Result<(), TxError> {
        let mut state = self.state();
        state.ensure_connected()?;

        if let Some(code) = state.chain_fault {
            return Err(TransmitError::Fault {
                command: "WVCHA",
                code,
            }
            .into());
        }

        let mut micros = Vec::with_capacity(handles.len());
        let mut carrier_pulses = 0;
        for handle in handles {
            let segment = state.segments.get(&handle.0).ok_or(TransmitError::Fault {
                command: "WVCHA",
                code: handle.0 as i32,
            })?;
            micros.push(segment.micros());
            carrier_pulses += segment.pulse_count();
        }

        let transmission = Transmission {
            handles: handles.to_vec(),
            micros,
            carrier_pulses,
        };
        let playing = Duration::from_micros(transmission.total_micros());
        info!(
            "Virtual device {} playing {} segments ({:?})",
            self.id,
            handles.len(),
            playing
        );

        if state.stuck {
            state.stuck_playing = true;
        } else {
            state.busy_until = Some(Instant::now() + playing);
        }
        state.transmissions.push(transmission);
        Ok(())
    }

    async fn is_busy(&mut self) -> Result<bool, TxError> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.is_playing())
    }

    async fn halt(&mut self) -> Result<(), TxError> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.stuck_playing = false;
        state.busy_until = None;
        state.halts += 1;
        Ok(())
    }

    async fn delete(&mut self, handle: SegmentHandle) -> Result<(), TxError> {
        let mut state = self.state();
        state.ensure_connected()?;
        if state.segments.remove(&handle.0).is_none() {
            return Err(TransmitError::Fault {
                command: "WVDEL",
                code: handle.0 as i32,
            }
            .into());
        }
        state.deleted += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut state = self.state();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
            debug!("Virtual device {} disconnected", self.id);
        }
    }
}

/// Shared handle on a virtual device's state
#[derive(Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make connection attempts succeed or fail
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Pretend another client holds the device
    pub fn set_held_elsewhere(&self, held: bool) {
        self.state().held_elsewhere = held;
    }

    /// Limit the segment table
    pub fn set_max_segments(&self, slots: usize) {
        self.state().max_segments = slots;
    }

    /// Fail every chain submission with `code`
    pub fn set_chain_fault(&self, code: Option<i32>) {
        self.state().chain_fault = code;
    }

    /// Keep reporting busy after a chain until halted
    pub fn set_stuck(&self, stuck: bool) {
        self.state().stuck = stuck;
    }

    /// Cut the connection as if the link dropped
    pub fn drop_link(&self) {
        self.state().connected = false;
    }

    /// Whether a client is connected
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Line last put into output mode
    pub fn output_gpio(&self) -> Option<u32> {
        self.state().output_gpio
    }

    /// Connection attempts, successful or not
    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    /// Successful connections
    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    /// Orderly disconnects
    pub fn disconnect_count(&self) -> u32 {
        self.state().disconnects
    }

    /// Segments currently stored
    pub fn live_segments(&self) -> usize {
        self.state().segments.len()
    }

    /// Most segments stored at once
    pub fn peak_segments(&self) -> usize {
        self.state().peak_segments
    }

    /// Segments ever stored
    pub fn registered_count(&self) -> u64 {
        self.state().registered
    }

    /// Segments ever deleted
    pub fn deleted_count(&self) -> u64 {
        self.state().deleted
    }

    /// Playbacks aborted by the client
    pub fn halt_count(&self) -> u32 {
        self.state().halts
    }

    /// Chains played so far
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state().transmissions.clone()
    }

    /// Wait until at least `count` chains were played, or `timeout` passes
    pub async fn wait_for_transmissions(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state().transmissions.len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the device has no client, or `timeout` passes
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.state().connected {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
