//! Infrared Transmit Pipeline
//!
//! This crate connects compiled IR waveforms to a hardware pulse generator.
//!
//! # Architecture
//!
//! - [`PulseDevice`]: the pulse generator interface (pigpio daemon, or the
//!   virtual device from `ir-sim`)
//! - [`HardwareChannel`]: one session with a device; registers segments,
//!   plays chains, releases everything it registered
//! - [`TransmitWorker`]: a single task draining a [`TransmitQueue`] of
//!   requests, holding the channel open only while there is work
//!
//! Request handlers only ever call [`TransmitQueue::enqueue`], which never
//! blocks. Hardware errors stay inside the worker: the affected request is
//! logged and dropped, and the worker moves on.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ir_tx::{PigpioDevice, TransmitWorker, WorkerConfig, DEFAULT_PIGPIO_PORT};
//! use ir_wave::{CarrierParams, TimingSequence};
//!
//! # async fn demo() {
//! let carrier = CarrierParams::new(17, 38.0).unwrap();
//! let device = PigpioDevice::new("127.0.0.1", DEFAULT_PIGPIO_PORT);
//!
//! let (worker, queue) = TransmitWorker::new(device, WorkerConfig::new(carrier));
//! let handle = worker.spawn();
//!
//! let code = Arc::new(TimingSequence::new(vec![762, 689, 1506]).unwrap());
//! queue.enqueue("light", code);
//!
//! let _device = handle.stop().await;
//! # }
//! ```

pub mod channel;
pub mod device;
pub mod error;
pub mod pigpio;
pub mod worker;

pub use channel::{
    ChannelConfig, ChannelState, HardwareChannel, DEFAULT_PLAYBACK_TIMEOUT_MS,
    DEFAULT_POLL_INTERVAL_MS,
};
pub use device::PulseDevice;
pub use error::{ConnectionError, TransmitError, TxError};
pub use pigpio::{PigpioDevice, DEFAULT_PIGPIO_PORT};
pub use worker::{
    QueueOrder, TransmitQueue, TransmitRequest, TransmitWorker, WorkerConfig, WorkerHandle,
    WorkerStats, DEFAULT_IDLE_POLL_MS,
};
