//! Error types for waveform construction

use thiserror::Error;

/// Errors raised while validating timing codes and carrier parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaveError {
    /// A timing sequence needs at least one mark
    #[error("timing sequence is empty")]
    EmptySequence,

    /// A single mark or space is longer than any remote sends
    #[error("element {index} is {micros}us, longer than {max}us")]
    ElementTooLong { index: usize, micros: u32, max: u32 },

    /// GPIO line does not fit in a 32-bit level mask
    #[error("gpio {0} out of range (0-31)")]
    InvalidGpio(u32),

    /// Carrier frequency must be positive and finite
    #[error("invalid carrier frequency: {0} kHz")]
    InvalidFrequency(f64),

    /// Duty cycle must lie in (0, 1]
    #[error("invalid duty cycle: {0}")]
    InvalidDutyCycle(f64),
}
