//! Infrared Waveform Library
//!
//! This crate turns infrared remote timing codes into hardware waveform
//! segments. It has no I/O of its own; the device side plugs in through the
//! [`SegmentRegistrar`] trait.
//!
//! # Concepts
//!
//! - **Mark**: a burst of carrier (e.g. 38 kHz) on the IR LED
//! - **Space**: a silence between marks
//! - **Segment**: a reusable waveform stored on the pulse generator
//! - **Playback chain**: the ordered list of segment handles played back
//!   as one transmission
//!
//! # Example
//!
//! ```rust
//! use ir_wave::{synthesize, CarrierParams, TimingSequence, WaveformPlan};
//!
//! let params = CarrierParams::new(17, 38.0).unwrap();
//! let code = TimingSequence::new(vec![762, 689, 762, 689, 1506]).unwrap();
//!
//! // One carrier burst for a 762us mark
//! let burst = synthesize(&params, 762);
//! assert_eq!(burst.len(), 58);
//!
//! // Two distinct marks and one distinct space
//! let plan = WaveformPlan::new(&code, &params);
//! assert_eq!(plan.segment_count(), 3);
//! ```

pub mod carrier;
pub mod compiler;
pub mod error;
pub mod timing;

pub use carrier::{burst_micros, cycle_count, synthesize};
pub use compiler::{compile, compile_plan, SegmentKey, SegmentRegistrar, WaveformPlan};
pub use error::WaveError;
pub use timing::{
    CarrierParams, Element, PlaybackChain, PulseBurst, SegmentHandle, TimingSequence,
    DEFAULT_DUTY_CYCLE, MAX_ELEMENT_MICROS, MAX_GPIO,
};
