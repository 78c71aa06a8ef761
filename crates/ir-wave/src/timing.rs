//! Timing codes, carrier parameters and the pulse/segment units built from them

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::WaveError;

/// Default fraction of each carrier period the line is held high
pub const DEFAULT_DUTY_CYCLE: f64 = 0.5;

/// Longest accepted mark or space
pub const MAX_ELEMENT_MICROS: u32 = 1_000_000;

/// Highest GPIO line addressable by a 32-bit level mask
pub const MAX_GPIO: u32 = 31;

/// One element of a timing sequence, classified by position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// Carrier burst (even index)
    Mark(u32),
    /// Silence (odd index)
    Space(u32),
}

impl Element {
    /// Duration in microseconds
    pub fn micros(&self) -> u32 {
        match self {
            Element::Mark(us) | Element::Space(us) => *us,
        }
    }
}

/// Mark/space timing code in microseconds
///
/// Even indices are marks, odd indices are spaces. A code may end on either
/// a mark or a space, but it is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Vec<u32>", into = "Vec<u32>")
)]
pub struct TimingSequence(Vec<u32>);

impl TimingSequence {
    /// Create a timing sequence
    ///
    /// Rejects empty codes and elements over [`MAX_ELEMENT_MICROS`].
    pub fn new(values: Vec<u32>) -> Result<Self, WaveError> {
        if values.is_empty() {
            return Err(WaveError::EmptySequence);
        }
        if let Some((index, &micros)) = values
            .iter()
            .enumerate()
            .find(|(_, us)| **us > MAX_ELEMENT_MICROS)
        {
            return Err(WaveError::ElementTooLong {
                index,
                micros,
                max: MAX_ELEMENT_MICROS,
            });
        }
        Ok(Self(values))
    }

    /// Raw durations
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Number of elements (marks plus spaces)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for the usual `len`/`is_empty` pairing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mark durations in order (even indices)
    pub fn marks(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().step_by(2).copied()
    }

    /// Space durations in order (odd indices)
    pub fn spaces(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().skip(1).step_by(2).copied()
    }

    /// Elements in order, tagged by parity
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.0.iter().enumerate().map(|(i, &us)| {
            if i & 1 == 0 {
                Element::Mark(us)
            } else {
                Element::Space(us)
            }
        })
    }

    /// Nominal length of the whole code
    pub fn total_micros(&self) -> u64 {
        self.0.iter().map(|&us| us as u64).sum()
    }
}

impl TryFrom<Vec<u32>> for TimingSequence {
    type Error = WaveError;

    fn try_from(values: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<TimingSequence> for Vec<u32> {
    fn from(seq: TimingSequence) -> Self {
        seq.0
    }
}

/// Carrier settings for the single physical transmitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierParams {
    gpio: u32,
    frequency_khz: f64,
    duty_cycle: f64,
}

impl CarrierParams {
    /// Create carrier parameters with the default 50% duty cycle
    pub fn new(gpio: u32, frequency_khz: f64) -> Result<Self, WaveError> {
        Self::with_duty_cycle(gpio, frequency_khz, DEFAULT_DUTY_CYCLE)
    }

    /// Create carrier parameters with an explicit duty cycle
    pub fn with_duty_cycle(gpio: u32, frequency_khz: f64, duty_cycle: f64) -> Result<Self, WaveError> {
        if gpio > MAX_GPIO {
            return Err(WaveError::InvalidGpio(gpio));
        }
        if !frequency_khz.is_finite() || frequency_khz <= 0.0 {
            return Err(WaveError::InvalidFrequency(frequency_khz));
        }
        if !(duty_cycle > 0.0 && duty_cycle <= 1.0) {
            return Err(WaveError::InvalidDutyCycle(duty_cycle));
        }
        Ok(Self {
            gpio,
            frequency_khz,
            duty_cycle,
        })
    }

    /// GPIO line driving the IR LED
    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    /// Level mask selecting the GPIO line
    pub fn gpio_mask(&self) -> u32 {
        1 << self.gpio
    }

    /// Carrier frequency in kHz
    pub fn frequency_khz(&self) -> f64 {
        self.frequency_khz
    }

    /// Fraction of each period held high
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    /// Length of one carrier cycle in microseconds
    pub fn period_micros(&self) -> f64 {
        1000.0 / self.frequency_khz
    }
}

/// One hardware pulse: lines to raise, lines to lower, then hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PulseBurst {
    /// GPIO lines switched high at the start of the pulse
    pub on_mask: u32,
    /// GPIO lines switched low at the start of the pulse
    pub off_mask: u32,
    /// Time to hold before the next pulse
    pub duration_us: u32,
}

impl PulseBurst {
    /// Raise `mask` and hold
    pub fn on(mask: u32, duration_us: u32) -> Self {
        Self {
            on_mask: mask,
            off_mask: 0,
            duration_us,
        }
    }

    /// Lower `mask` and hold
    pub fn off(mask: u32, duration_us: u32) -> Self {
        Self {
            on_mask: 0,
            off_mask: mask,
            duration_us,
        }
    }

    /// Touch no line, just wait
    pub fn silence(duration_us: u32) -> Self {
        Self {
            on_mask: 0,
            off_mask: 0,
            duration_us,
        }
    }
}

/// Identifier of a waveform segment registered on the device
///
/// Only meaningful for the connection that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentHandle(pub u32);

impl SegmentHandle {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Ordered segment handles making up one transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackChain(Vec<SegmentHandle>);

impl PlaybackChain {
    /// Wrap an ordered list of handles
    pub fn new(handles: Vec<SegmentHandle>) -> Self {
        Self(handles)
    }

    /// Handles in playback order
    pub fn handles(&self) -> &[SegmentHandle] {
        &self.0
    }

    /// Number of chain entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing would be played
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
