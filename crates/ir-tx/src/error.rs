//! Error types for the transmit pipeline

use ir_wave::WaveError;
use thiserror::Error;

/// Failures reaching or holding the pulse generator
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Device could not be reached
    #[error("device unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// Device is exclusively held by someone else
    #[error("device {0} is busy or in use")]
    Busy(String),

    /// Device refused to configure the transmit line
    #[error("device rejected gpio {gpio} setup (code {code})")]
    Rejected { gpio: u32, code: i32 },

    /// Operation needs an open channel
    #[error("hardware channel is not open")]
    NotOpen,

    /// Connection dropped or garbled mid-session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while playing back a chain
#[derive(Debug, Error)]
pub enum TransmitError {
    /// Device reported a fault
    #[error("{command} failed with code {code}")]
    Fault { command: &'static str, code: i32 },

    /// Chain references a segment this channel never registered
    #[error("segment {0} is not registered")]
    UnknownSegment(u32),

    /// Playback did not finish in time
    #[error("playback still busy after {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

/// Errors that can occur while transmitting a code
#[derive(Debug, Error)]
pub enum TxError {
    /// Connection-level failure; the channel must be reset
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Device segment table exhausted
    #[error("segment table exhausted: {command} failed with code {code}")]
    Capacity { command: &'static str, code: i32 },

    /// Playback failure for the current code only
    #[error("transmit error: {0}")]
    Transmit(#[from] TransmitError),

    /// Invalid timing code or carrier parameters
    #[error("waveform error: {0}")]
    Wave(#[from] WaveError),
}

impl TxError {
    /// Whether the hardware session is unusable after this error
    pub fn is_connection_level(&self) -> bool {
        matches!(self, TxError::Connection(_))
    }
}

impl From<std::io::Error> for TxError {
    fn from(e: std::io::Error) -> Self {
        TxError::Connection(ConnectionError::Io(e))
    }
}
