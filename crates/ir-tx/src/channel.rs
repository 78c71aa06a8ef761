//! Hardware channel
//!
//! Owns one pulse generator and the segments registered on it during the
//! current session. The channel is either `Closed` or `Open`; every
//! operation other than [`HardwareChannel::open`] needs it open.
//!
//! The channel keeps its own list of outstanding segment handles, so a
//! failed transmission can always be cleaned up and [`HardwareChannel::close`]
//! never leaves segments behind on the device.

use std::time::{Duration, Instant};

use ir_wave::{compile, CarrierParams, PlaybackChain, PulseBurst, SegmentHandle, SegmentRegistrar, TimingSequence};
use tracing::{debug, info, warn};

use crate::device::PulseDevice;
use crate::error::{ConnectionError, TransmitError, TxError};

/// Default busy-poll interval while a chain plays
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default upper bound on a single playback
pub const DEFAULT_PLAYBACK_TIMEOUT_MS: u64 = 10_000;

/// Channel timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How often to ask the device whether playback finished
    pub poll_interval: Duration,
    /// Give up on a playback after this long (`None` waits forever)
    pub playback_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            playback_timeout: Some(Duration::from_millis(DEFAULT_PLAYBACK_TIMEOUT_MS)),
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection
    Closed,
    /// Connected, transmit line configured
    Open,
}

/// Session with a pulse generator
pub struct HardwareChannel<D> {
    device: D,
    config: ChannelConfig,
    state: ChannelState,
    /// Segments registered since `open()` and not yet released
    outstanding: Vec<SegmentHandle>,
}

impl<D: PulseDevice> HardwareChannel<D> {
    /// Wrap a device; the channel starts closed
    pub fn new(device: D, config: ChannelConfig) -> Self {
        Self {
            device,
            config,
            state: ChannelState::Closed,
            outstanding: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the channel is open
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Number of segments registered and not yet released
    pub fn outstanding_segments(&self) -> usize {
        self.outstanding.len()
    }

    /// Access the underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Take back the device
    pub fn into_device(self) -> D {
        self.device
    }

    fn ensure_open(&self) -> Result<(), TxError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ConnectionError::NotOpen.into())
        }
    }

    /// Connect and configure `gpio` as the transmit line
    pub async fn open(&mut self, gpio: u32) -> Result<(), TxError> {
        if self.is_open() {
            return Ok(());
        }

        self.device.connect().await?;
        if let Err(e) = self.device.set_output(gpio).await {
            self.device.disconnect().await;
            return Err(e);
        }

        self.outstanding.clear();
        self.state = ChannelState::Open;
        info!("Hardware channel open on {} (gpio {})", self.device.describe(), gpio);
        Ok(())
    }

    /// Upload a carrier burst
    pub async fn register_burst(&mut self, pulses: &[PulseBurst]) -> Result<SegmentHandle, TxError> {
        self.ensure_open()?;
        let handle = self.device.add_waveform(pulses).await?;
        self.outstanding.push(handle);
        Ok(handle)
    }

    /// Upload a silence of `duration_us`
    pub async fn register_silence(&mut self, duration_us: u32) -> Result<SegmentHandle, TxError> {
        self.ensure_open()?;
        let handle = self.device.add_silence(duration_us).await?;
        self.outstanding.push(handle);
        Ok(handle)
    }

    /// Play `chain` and wait for the device to finish
    ///
    /// Polls at the configured interval. When a playback timeout is set and
    /// exceeded, playback is halted and `TransmitError::Timeout` returned.
    pub async fn submit_and_wait(&mut self, chain: &PlaybackChain) -> Result<(), TxError> {
        self.ensure_open()?;

        if let Some(unknown) = chain.handles().iter().find(|h| !self.outstanding.contains(*h)) {
            return Err(TransmitError::UnknownSegment(unknown.0).into());
        }

        self.device.submit_chain(chain.handles()).await?;
        debug!("Chain of {} segments submitted", chain.len());

        let started = Instant::now();
        while self.device.is_busy().await? {
            if let Some(limit) = self.config.playback_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    if let Err(e) = self.device.halt().await {
                        warn!("Failed to halt stuck playback: {}", e);
                    }
                    return Err(TransmitError::Timeout {
                        waited_ms: waited.as_millis() as u64,
                    }
                    .into());
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        debug!("Playback finished after {:?}", started.elapsed());
        Ok(())
    }

    /// Free one segment; unknown handles are ignored
    pub async fn release(&mut self, handle: SegmentHandle) -> Result<(), TxError> {
        self.ensure_open()?;
        let Some(pos) = self.outstanding.iter().position(|h| *h == handle) else {
            debug!("Segment {} already released", handle.0);
            return Ok(());
        };
        self.outstanding.swap_remove(pos);
        self.device.delete(handle).await
    }

    /// Free every outstanding segment
    ///
    /// Keeps going after a failure and reports the first one. The handles
    /// are forgotten either way.
    pub async fn release_all(&mut self) -> Result<(), TxError> {
        let mut first_error = None;
        for handle in std::mem::take(&mut self.outstanding) {
            if let Err(e) = self.device.delete(handle).await {
                warn!("Failed to release segment {}: {}", handle.0, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Compile, play and clean up one timing code
    ///
    /// Every segment registered for the code is released before returning,
    /// whether or not playback succeeded. The playback error wins over a
    /// release error.
    pub async fn transmit(&mut self, code: &TimingSequence, carrier: &CarrierParams) -> Result<(), TxError> {
        self.ensure_open()?;

        let played = self.play(code, carrier).await;
        let released = self.release_all().await;

        played.and(released)
    }

    async fn play(&mut self, code: &TimingSequence, carrier: &CarrierParams) -> Result<(), TxError> {
        let chain = compile(code, carrier, self).await?;
        debug!(
            "Compiled {} elements into {} segments",
            code.len(),
            self.outstanding.len()
        );
        self.submit_and_wait(&chain).await
    }

    /// Release everything and disconnect
    pub async fn close(&mut self) {
        if !self.is_open() {
            return;
        }

        if let Err(e) = self.release_all().await {
            warn!("Segments left on device at close: {}", e);
        }
        self.device.disconnect().await;
        self.state = ChannelState::Closed;
        info!("Hardware channel closed");
    }
}

impl<D: PulseDevice> SegmentRegistrar for HardwareChannel<D> {
    type Error = TxError;

    async fn register_burst(&mut self, pulses: &[PulseBurst]) -> Result<SegmentHandle, TxError> {
        HardwareChannel::register_burst(self, pulses).await
    }

    async fn register_silence(&mut self, duration_us: u32) -> Result<SegmentHandle, TxError> {
        HardwareChannel::register_silence(self, duration_us).await
    }
}
