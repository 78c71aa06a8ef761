//! Transmit worker
//!
//! A single task owns the [`HardwareChannel`] and drains a queue of pending
//! transmit requests. Request handlers only touch the queue, so they never
//! wait on hardware playback.
//!
//! The worker is idle with the channel closed while the queue is empty. When
//! requests arrive it opens the channel once, transmits until the queue is
//! empty again, and closes it. If the channel cannot be opened, everything
//! pending is dropped and the next enqueue triggers a fresh attempt.
//!
//! Stopping is graceful: every request enqueued before
//! [`WorkerHandle::stop`] is still transmitted. Requests enqueued after it
//! are discarded.
//!
//! # Example
//!
//! ```rust,ignore
//! let (worker, queue) = TransmitWorker::new(device, WorkerConfig::new(carrier));
//! let handle = worker.spawn();
//!
//! queue.enqueue("light", code);
//!
//! let device = handle.stop().await?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ir_wave::{CarrierParams, TimingSequence};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::channel::{ChannelConfig, HardwareChannel};
use crate::device::PulseDevice;

/// Default wake-up interval while idle
pub const DEFAULT_IDLE_POLL_MS: u64 = 50;

/// Order in which pending requests are taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Oldest request first
    #[default]
    Fifo,
    /// Most recent request first
    Lifo,
}

/// A code waiting to be transmitted
#[derive(Debug, Clone)]
pub struct TransmitRequest {
    /// Button name, for logs
    pub id: String,
    /// Timing code to send
    pub code: Arc<TimingSequence>,
    /// Position in enqueue order, starting at 1
    pub seq: u64,
}

#[derive(Default)]
struct Pending {
    requests: VecDeque<TransmitRequest>,
    enqueued: u64,
}

struct QueueInner {
    pending: Mutex<Pending>,
    order: QueueOrder,
    wake: Notify,
}

/// Pending requests shared between request handlers and the worker
///
/// Cloning is cheap; all clones refer to the same queue.
#[derive(Clone)]
pub struct TransmitQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for TransmitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitQueue")
            .field("order", &self.inner.order)
            .field("pending", &self.len())
            .finish()
    }
}

impl TransmitQueue {
    /// Create an empty queue
    pub fn new(order: QueueOrder) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(Pending::default()),
                order,
                wake: Notify::new(),
            }),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a request and wake the worker; returns the new queue depth
    pub fn enqueue(&self, id: impl Into<String>, code: Arc<TimingSequence>) -> usize {
        let depth = {
            let mut pending = self.pending();
            pending.enqueued += 1;
            let request = TransmitRequest {
                id: id.into(),
                code,
                seq: pending.enqueued,
            };
            pending.requests.push_back(request);
            pending.requests.len()
        };
        self.inner.wake.notify_one();
        depth
    }

    /// Take the next request according to the queue order
    pub fn pop(&self) -> Option<TransmitRequest> {
        let mut pending = self.pending();
        match self.inner.order {
            QueueOrder::Fifo => pending.requests.pop_front(),
            QueueOrder::Lifo => pending.requests.pop_back(),
        }
    }

    /// Drop every pending request, returning how many there were
    pub fn clear(&self) -> usize {
        let mut pending = self.pending();
        let n = pending.requests.len();
        pending.requests.clear();
        n
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.pending().requests.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending().requests.is_empty()
    }

    /// Requests ever enqueued; equal to the newest request's `seq`
    pub fn enqueued(&self) -> u64 {
        self.pending().enqueued
    }

    /// Configured order
    pub fn order(&self) -> QueueOrder {
        self.inner.order
    }

    /// Wait for an enqueue, at most `max`
    async fn wait(&self, max: Duration) {
        let _ = tokio::time::timeout(max, self.inner.wake.notified()).await;
    }
}

/// Worker configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    /// Carrier used for every mark
    pub carrier: CarrierParams,
    /// Hardware channel timing
    pub channel: ChannelConfig,
    /// Request ordering
    pub order: QueueOrder,
    /// Longest sleep between queue checks while idle
    pub idle_poll: Duration,
}

impl WorkerConfig {
    /// Defaults for the given carrier
    pub fn new(carrier: CarrierParams) -> Self {
        Self {
            carrier,
            channel: ChannelConfig::default(),
            order: QueueOrder::default(),
            idle_poll: Duration::from_millis(DEFAULT_IDLE_POLL_MS),
        }
    }
}

/// Counters for one worker lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Codes played to completion
    pub transmitted: u64,
    /// Requests dropped after an error
    pub dropped: u64,
    /// Requests skipped because they arrived after stop
    pub discarded: u64,
    /// Times the channel was opened
    pub sessions: u64,
}

/// Owns the hardware channel and drains the transmit queue
pub struct TransmitWorker<D> {
    channel: HardwareChannel<D>,
    carrier: CarrierParams,
    queue: TransmitQueue,
    idle_poll: Duration,
    stats: WorkerStats,
}

impl<D: PulseDevice + 'static> TransmitWorker<D> {
    /// Create a worker and the queue that feeds it
    pub fn new(device: D, config: WorkerConfig) -> (Self, TransmitQueue) {
        let queue = TransmitQueue::new(config.order);
        let worker = Self {
            channel: HardwareChannel::new(device, config.channel),
            carrier: config.carrier,
            queue: queue.clone(),
            idle_poll: config.idle_poll,
            stats: WorkerStats::default(),
        };
        (worker, queue)
    }

    /// Another handle on this worker's queue
    pub fn queue(&self) -> TransmitQueue {
        self.queue.clone()
    }

    /// Counters so far
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run the worker on its own task
    pub fn spawn(self) -> WorkerHandle<D> {
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let queue = self.queue.clone();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            queue,
            shutdown_tx,
            join,
        }
    }

    /// Worker loop; returns the device once shut down
    ///
    /// `shutdown` carries a stop cutoff: once it is `Some(seq)`, the worker
    /// transmits every pending request with a sequence number up to `seq`,
    /// discards later ones and exits. Dropping the sender stops the worker
    /// when it is next idle.
    pub async fn run(mut self, mut shutdown: watch::Receiver<Option<u64>>) -> D {
        info!("Transmit worker started ({:?} order)", self.queue.order());

        loop {
            if shutdown.borrow().is_some() {
                self.drain(&shutdown).await;
                break;
            }

            if self.queue.is_empty() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.queue.wait(self.idle_poll) => {}
                }
                continue;
            }

            self.drain(&shutdown).await;
        }

        self.channel.close().await;

        let discarded = self.stats.discarded + self.queue.clear() as u64;
        if discarded > 0 {
            warn!("Discarded {} requests enqueued after stop", discarded);
        }
        info!(
            "Transmit worker stopped: {} transmitted, {} dropped, {} sessions",
            self.stats.transmitted, self.stats.dropped, self.stats.sessions
        );

        self.channel.into_device()
    }

    /// Transmit until the queue is empty, then close
    ///
    /// Once a stop cutoff is set, requests enqueued after it are skipped.
    async fn drain(&mut self, shutdown: &watch::Receiver<Option<u64>>) {
        debug!("Queue active with {} pending", self.queue.len());

        while let Some(request) = self.queue.pop() {
            let cutoff = *shutdown.borrow();
            if cutoff.is_some_and(|last| request.seq > last) {
                debug!("Skipping '{}' enqueued after stop", request.id);
                self.stats.discarded += 1;
                continue;
            }

            if !self.channel.is_open() {
                match self.channel.open(self.carrier.gpio()).await {
                    Ok(()) => self.stats.sessions += 1,
                    Err(e) => {
                        let pending = self.queue.clear();
                        warn!(
                            "Dropping '{}' and {} pending: cannot open hardware channel: {}",
                            request.id, pending, e
                        );
                        self.stats.dropped += 1 + pending as u64;
                        break;
                    }
                }
            }

            self.process(request).await;
        }

        self.channel.close().await;
    }

    async fn process(&mut self, request: TransmitRequest) {
        info!("Transmitting '{}' ({} elements)", request.id, request.code.len());

        match self.channel.transmit(&request.code, &self.carrier).await {
            Ok(()) => {
                self.stats.transmitted += 1;
                debug!("'{}' sent", request.id);
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("Dropping '{}': {}", request.id, e);
                if e.is_connection_level() {
                    self.channel.close().await;
                }
            }
        }
    }
}

/// Control handle for a spawned worker
pub struct WorkerHandle<D> {
    queue: TransmitQueue,
    shutdown_tx: watch::Sender<Option<u64>>,
    join: JoinHandle<D>,
}

impl<D> WorkerHandle<D> {
    /// The worker's queue
    pub fn queue(&self) -> &TransmitQueue {
        &self.queue
    }

    /// Queue a code; never blocks
    pub fn enqueue(&self, id: impl Into<String>, code: Arc<TimingSequence>) -> usize {
        self.queue.enqueue(id, code)
    }

    /// Whether the worker task has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the worker to stop and wait for it
    ///
    /// Everything enqueued before this call is transmitted first, including
    /// the in-flight code. Requests enqueued afterwards are discarded.
    pub async fn stop(self) -> Result<D, JoinError> {
        let cutoff = self.queue.enqueued();
        let _ = self.shutdown_tx.send(Some(cutoff));
        self.join.await
    }
}
