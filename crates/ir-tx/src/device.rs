//! Pulse generator device abstraction
//!
//! A pulse generator stores waveform segments and plays chains of them with
//! hardware timing. The pigpio daemon is the real backend (see
//! [`crate::pigpio`]); `ir-sim` provides a virtual one for tests.
//!
//! Methods return `Send` futures so a device can live inside a spawned
//! worker task.

use std::future::Future;

use ir_wave::{PulseBurst, SegmentHandle};

use crate::error::TxError;

/// Pulse generator operations used by [`crate::HardwareChannel`]
pub trait PulseDevice: Send {
    /// Human-readable identity for logs
    fn describe(&self) -> String;

    /// Establish the connection
    fn connect(&mut self) -> impl Future<Output = Result<(), TxError>> + Send;

    /// Put `gpio` into output mode
    fn set_output(&mut self, gpio: u32) -> impl Future<Output = Result<(), TxError>> + Send;

    /// Store a pulse sequence as a segment
    fn add_waveform(
        &mut self,
        pulses: &[PulseBurst],
    ) -> impl Future<Output = Result<SegmentHandle, TxError>> + Send;

    /// Store a pure wait as a segment
    fn add_silence(
        &mut self,
        duration_us: u32,
    ) -> impl Future<Output = Result<SegmentHandle, TxError>> + Send;

    /// Start playing segments back to back
    fn submit_chain(
        &mut self,
        handles: &[SegmentHandle],
    ) -> impl Future<Output = Result<(), TxError>> + Send;

    /// Whether a chain is still playing
    fn is_busy(&mut self) -> impl Future<Output = Result<bool, TxError>> + Send;

    /// Abort the current playback
    fn halt(&mut self) -> impl Future<Output = Result<(), TxError>> + Send;

    /// Free a segment
    fn delete(&mut self, handle: SegmentHandle) -> impl Future<Output = Result<(), TxError>> + Send;

    /// Drop the connection
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}
