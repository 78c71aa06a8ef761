//! IR Transmit Simulation Library
//!
//! This crate provides a simulated pulse generator for testing the transmit
//! pipeline without a Raspberry Pi or pigpio daemon. It includes:
//!
//! - **VirtualPulseDevice**: stores segments, "plays" chains in real time and
//!   records every transmission
//! - **SimProbe**: a shared view of the device state for assertions and
//!   fault injection (unreachable device, full segment table, playback
//!   faults, stuck playback, dropped link)
//!
//! # Example
//!
//! ```rust
//! use ir_sim::VirtualPulseDevice;
//!
//! let device = VirtualPulseDevice::new("bench");
//! let probe = device.probe();
//!
//! // Make the next connection attempt fail
//! probe.set_reachable(false);
//! assert_eq!(probe.connect_count(), 0);
//! ```

pub mod device;

pub use device::{SimProbe, SimSegment, Transmission, VirtualPulseDevice, DEFAULT_SEGMENT_SLOTS};
