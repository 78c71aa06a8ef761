//! Integration tests for the transmit pipeline
//!
//! These tests run the hardware channel and the transmit worker against the
//! virtual pulse generator from `ir-sim`:
//! - Segment registration, reuse and release
//! - Playback faults, capacity exhaustion and stuck playback
//! - Worker session handling (open once per drain, close when idle)
//! - Queue ordering and shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ir_sim::{SimProbe, VirtualPulseDevice};
use ir_tx::{
    ChannelConfig, ChannelState, ConnectionError, HardwareChannel, QueueOrder, TransmitError,
    TransmitWorker, TxError, WorkerConfig,
};
use ir_wave::{CarrierParams, PlaybackChain, SegmentHandle, TimingSequence};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const WAIT: Duration = Duration::from_secs(5);

    pub fn carrier() -> CarrierParams {
        CarrierParams::new(17, 38.0).unwrap()
    }

    pub fn fast_channel() -> ChannelConfig {
        ChannelConfig {
            poll_interval: Duration::from_millis(1),
            playback_timeout: Some(Duration::from_secs(2)),
        }
    }

    pub fn fast_worker(order: QueueOrder) -> WorkerConfig {
        WorkerConfig {
            carrier: carrier(),
            channel: fast_channel(),
            order,
            idle_poll: Duration::from_millis(5),
        }
    }

    pub fn code(values: &[u32]) -> Arc<TimingSequence> {
        Arc::new(TimingSequence::new(values.to_vec()).unwrap())
    }

    /// The "light" button of the Roblin remote
    pub fn light() -> Arc<TimingSequence> {
        code(&[
            762, 689, 762, 689, 1506, 1378, 762, 689, 762, 689, 1506, 2784, 762, 689, 762, 689, 2238,
        ])
    }

    /// Short code told apart by its single space
    pub fn tagged(space: u32) -> Arc<TimingSequence> {
        code(&[560, space, 560])
    }

    /// Space length of each transmission, for tagged codes
    pub fn tags(probe: &SimProbe) -> Vec<u64> {
        probe.transmissions().iter().map(|t| t.micros[1]).collect()
    }

    pub fn channel() -> (HardwareChannel<VirtualPulseDevice>, SimProbe) {
        let device = VirtualPulseDevice::new("bench");
        let probe = device.probe();
        (HardwareChannel::new(device, fast_channel()), probe)
    }

    pub async fn wait_until<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

// ============================================================================
// Hardware Channel Tests
// ============================================================================

mod channel_tests {
    use super::*;

    #[tokio::test]
    async fn open_configures_gpio_and_close_disconnects() {
        let (mut channel, probe) = helpers::channel();
        assert_eq!(channel.state(), ChannelState::Closed);

        channel.open(17).await.unwrap();
        assert_eq!(channel.state(), ChannelState::Open);
        assert!(probe.is_connected());
        assert_eq!(probe.output_gpio(), Some(17));

        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!probe.is_connected());
        assert_eq!(probe.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn operations_need_open_channel() {
        let (mut channel, _probe) = helpers::channel();

        let err = channel.register_silence(100).await.unwrap_err();
        assert!(matches!(err, TxError::Connection(ConnectionError::NotOpen)));

        let err = channel
            .transmit(&helpers::light(), &helpers::carrier())
            .await
            .unwrap_err();
        assert!(err.is_connection_level());
    }

    #[tokio::test]
    async fn open_fails_when_unreachable() {
        let (mut channel, probe) = helpers::channel();
        probe.set_reachable(false);

        let err = channel.open(17).await.unwrap_err();
        assert!(matches!(err, TxError::Connection(ConnectionError::Unreachable { .. })));
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn open_fails_when_held_elsewhere() {
        let (mut channel, probe) = helpers::channel();
        probe.set_held_elsewhere(true);

        let err = channel.open(17).await.unwrap_err();
        assert!(matches!(err, TxError::Connection(ConnectionError::Busy(_))));
    }

    #[tokio::test]
    async fn transmit_registers_distinct_values_once() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();

        channel.transmit(&helpers::light(), &helpers::carrier()).await.unwrap();

        // 3 distinct marks + 3 distinct spaces
        assert_eq!(probe.registered_count(), 6);
        assert_eq!(probe.peak_segments(), 6);

        let sent = probe.transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].handles.len(), 17);
        assert_eq!(sent[0].handles[0], sent[0].handles[2]);
        assert_eq!(sent[0].micros[1], 689);
        assert_eq!(sent[0].micros[11], 2784);
        // 762us mark is 29 carrier cycles
        assert_eq!(sent[0].micros[0], 763);

        // Nothing left behind
        assert_eq!(channel.outstanding_segments(), 0);
        assert_eq!(probe.live_segments(), 0);
        assert_eq!(probe.deleted_count(), 6);
    }

    #[tokio::test]
    async fn capacity_error_releases_partial_registration() {
        let (mut channel, probe) = helpers::channel();
        probe.set_max_segments(4);
        channel.open(17).await.unwrap();

        let err = channel
            .transmit(&helpers::light(), &helpers::carrier())
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Capacity { .. }));
        assert!(probe.transmissions().is_empty());
        assert_eq!(probe.registered_count(), 4);
        assert_eq!(probe.live_segments(), 0);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn playback_fault_releases_segments() {
        let (mut channel, probe) = helpers::channel();
        probe.set_chain_fault(Some(-1));
        channel.open(17).await.unwrap();

        let err = channel
            .transmit(&helpers::light(), &helpers::carrier())
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Transmit(TransmitError::Fault { .. })));
        assert!(!err.is_connection_level());
        assert_eq!(probe.live_segments(), 0);
    }

    #[tokio::test]
    async fn stuck_playback_times_out_and_halts() {
        let device = VirtualPulseDevice::new("stuck");
        let probe = device.probe();
        probe.set_stuck(true);
        let mut channel = HardwareChannel::new(
            device,
            ChannelConfig {
                poll_interval: Duration::from_millis(1),
                playback_timeout: Some(Duration::from_millis(30)),
            },
        );
        channel.open(17).await.unwrap();

        let err = channel
            .transmit(&helpers::tagged(1000), &helpers::carrier())
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Transmit(TransmitError::Timeout { .. })));
        assert_eq!(probe.halt_count(), 1);
        assert_eq!(probe.live_segments(), 0);
    }

    #[tokio::test]
    async fn unregistered_handle_is_rejected() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();

        let err = channel
            .submit_and_wait(&PlaybackChain::new(vec![SegmentHandle(42)]))
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Transmit(TransmitError::UnknownSegment(42))));
        assert!(probe.transmissions().is_empty());
    }

    #[tokio::test]
    async fn release_is_once_per_handle() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();

        let handle = channel.register_silence(500).await.unwrap();
        channel.release(handle).await.unwrap();
        channel.release(handle).await.unwrap();

        assert_eq!(probe.deleted_count(), 1);
        assert_eq!(channel.outstanding_segments(), 0);
    }

    #[tokio::test]
    async fn close_releases_outstanding_segments() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();

        channel.register_silence(500).await.unwrap();
        channel.register_burst(&[]).await.unwrap();
        assert_eq!(probe.live_segments(), 2);

        channel.close().await;
        assert_eq!(probe.live_segments(), 0);
    }

    #[tokio::test]
    async fn dropped_link_is_connection_level() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();
        probe.drop_link();

        let err = channel
            .transmit(&helpers::light(), &helpers::carrier())
            .await
            .unwrap_err();
        assert!(err.is_connection_level());

        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);

        // A fresh session works again
        channel.open(17).await.unwrap();
        channel.transmit(&helpers::light(), &helpers::carrier()).await.unwrap();
        assert_eq!(probe.transmissions().len(), 1);
    }

    #[tokio::test]
    async fn zero_length_elements_still_get_segments() {
        let (mut channel, probe) = helpers::channel();
        channel.open(17).await.unwrap();

        channel
            .transmit(&helpers::code(&[0, 0, 560]), &helpers::carrier())
            .await
            .unwrap();

        assert_eq!(probe.registered_count(), 3);
        assert_eq!(probe.transmissions()[0].micros, vec![0, 0, 553]);
    }
}

// ============================================================================
// Transmit Worker Tests
// ============================================================================

mod worker_tests {
    use super::*;

    fn worker(order: QueueOrder) -> (TransmitWorker<VirtualPulseDevice>, ir_tx::TransmitQueue, SimProbe) {
        let device = VirtualPulseDevice::new("worker");
        let probe = device.probe();
        let (worker, queue) = TransmitWorker::new(device, helpers::fast_worker(order));
        (worker, queue, probe)
    }

    #[tokio::test]
    async fn single_request_opens_and_closes_once() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);
        let handle = worker.spawn();

        queue.enqueue("light", helpers::light());

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        assert!(probe.wait_for_idle(helpers::WAIT).await);

        assert_eq!(probe.connect_count(), 1);
        assert_eq!(probe.disconnect_count(), 1);
        assert_eq!(probe.live_segments(), 0);
        assert_eq!(probe.transmissions()[0].handles.len(), 17);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn idle_worker_never_connects() {
        let (worker, _queue, probe) = worker(QueueOrder::Fifo);
        let handle = worker.spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let device = handle.stop().await.unwrap();
        assert_eq!(device.id(), "worker");
        assert_eq!(probe.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn queued_requests_share_one_session() {
        let (worker, queue, probe) = worker(QueueOrder::Lifo);

        queue.enqueue("light", helpers::light());
        queue.enqueue("power", helpers::tagged(1420));
        let handle = worker.spawn();

        assert!(probe.wait_for_transmissions(2, helpers::WAIT).await);
        assert!(probe.wait_for_idle(helpers::WAIT).await);

        assert_eq!(probe.connect_count(), 1);
        assert_eq!(probe.disconnect_count(), 1);
        // Most recent first
        assert_eq!(probe.transmissions()[0].handles.len(), 3);
        assert_eq!(probe.transmissions()[1].handles.len(), 17);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifo_plays_most_recent_first() {
        let (worker, queue, probe) = worker(QueueOrder::Lifo);

        queue.enqueue("a", helpers::tagged(1000));
        queue.enqueue("b", helpers::tagged(2000));
        queue.enqueue("c", helpers::tagged(3000));
        let handle = worker.spawn();

        assert!(probe.wait_for_transmissions(3, helpers::WAIT).await);
        assert_eq!(helpers::tags(&probe), vec![3000, 2000, 1000]);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn fifo_plays_oldest_first() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);

        queue.enqueue("a", helpers::tagged(1000));
        queue.enqueue("b", helpers::tagged(2000));
        queue.enqueue("c", helpers::tagged(3000));
        let handle = worker.spawn();

        assert!(probe.wait_for_transmissions(3, helpers::WAIT).await);
        assert_eq!(helpers::tags(&probe), vec![1000, 2000, 3000]);
        assert_eq!(probe.connect_count(), 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_during_playback_joins_the_session() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);
        let handle = worker.spawn();

        // ~200ms of playback leaves room to enqueue mid-transmission
        queue.enqueue("long", helpers::tagged(200_000));
        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        queue.enqueue("short", helpers::tagged(1000));

        assert!(probe.wait_for_transmissions(2, helpers::WAIT).await);
        assert!(probe.wait_for_idle(helpers::WAIT).await);
        assert_eq!(probe.connect_count(), 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_device_drops_item_and_recovers() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);
        probe.set_reachable(false);
        let handle = worker.spawn();

        queue.enqueue("a", helpers::tagged(1000));
        let (p, q) = (&probe, &queue);
        assert!(helpers::wait_until(|| async move { p.connect_attempts() >= 1 }).await);
        assert!(helpers::wait_until(|| async move { q.is_empty() }).await);
        assert!(!handle.is_finished());

        probe.set_reachable(true);
        queue.enqueue("b", helpers::tagged(2000));

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        assert_eq!(helpers::tags(&probe), vec![2000]);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn open_failure_drops_pass_with_one_attempt() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);
        probe.set_reachable(false);

        for tag in [1000, 2000, 3000] {
            queue.enqueue("a", helpers::tagged(tag));
        }
        let handle = worker.spawn();

        let q = &queue;
        assert!(helpers::wait_until(|| async move { q.is_empty() }).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.connect_attempts(), 1);

        probe.set_reachable(true);
        queue.enqueue("b", helpers::tagged(4000));

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        assert_eq!(helpers::tags(&probe), vec![4000]);
        assert_eq!(probe.connect_attempts(), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn capacity_failure_drops_only_that_item() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);
        probe.set_max_segments(3);

        queue.enqueue("light", helpers::light());
        queue.enqueue("small", helpers::tagged(1000));
        let handle = worker.spawn();

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        assert!(probe.wait_for_idle(helpers::WAIT).await);

        assert_eq!(helpers::tags(&probe), vec![1000]);
        assert_eq!(probe.connect_count(), 1);
        assert_eq!(probe.live_segments(), 0);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_finishes_everything_queued_before_it() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);

        queue.enqueue("long", helpers::tagged(150_000));
        queue.enqueue("next", helpers::tagged(1000));
        queue.enqueue("third", helpers::tagged(2000));
        let handle = worker.spawn();

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        handle.stop().await.unwrap();

        assert_eq!(helpers::tags(&probe), vec![150_000, 1000, 2000]);
        assert_eq!(probe.connect_count(), 1);
        assert_eq!(probe.live_segments(), 0);
        assert!(!probe.is_connected());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn requests_after_stop_are_discarded() {
        let (worker, queue, probe) = worker(QueueOrder::Fifo);

        queue.enqueue("long", helpers::tagged(150_000));
        queue.enqueue("next", helpers::tagged(1000));
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(None);
        let task = tokio::spawn(worker.run(stop_rx));

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        stop_tx.send(Some(queue.enqueued())).unwrap();
        queue.enqueue("late", helpers::tagged(3000));
        task.await.unwrap();

        assert_eq!(helpers::tags(&probe), vec![150_000, 1000]);
        assert!(queue.is_empty());
        assert!(!probe.is_connected());
    }

    #[tokio::test]
    async fn stop_keeps_earlier_requests_in_lifo_order() {
        let (worker, queue, probe) = worker(QueueOrder::Lifo);

        queue.enqueue("a", helpers::tagged(1000));
        queue.enqueue("long", helpers::tagged(150_000));
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(None);
        let task = tokio::spawn(worker.run(stop_rx));

        assert!(probe.wait_for_transmissions(1, helpers::WAIT).await);
        stop_tx.send(Some(queue.enqueued())).unwrap();
        queue.enqueue("late", helpers::tagged(3000));
        task.await.unwrap();

        // "late" is newest, so it is popped first and skipped
        assert_eq!(helpers::tags(&probe), vec![150_000, 1000]);
        assert!(queue.is_empty());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn timing_code() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(prop::sample::select(vec![0u32, 120, 560, 689, 1690]), 1..24)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn no_segment_leaks_across_requests(codes in prop::collection::vec(timing_code(), 1..4)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (mut channel, probe) = helpers::channel();
                channel.open(17).await.unwrap();

                for values in &codes {
                    let seq = TimingSequence::new(values.clone()).unwrap();
                    let before = probe.registered_count();
                    channel.transmit(&seq, &helpers::carrier()).await.unwrap();

                    let mut marks: Vec<u32> = seq.marks().collect();
                    marks.sort_unstable();
                    marks.dedup();
                    let mut spaces: Vec<u32> = seq.spaces().collect();
                    spaces.sort_unstable();
                    spaces.dedup();

                    assert_eq!(probe.registered_count() - before, (marks.len() + spaces.len()) as u64);
                    assert_eq!(probe.live_segments(), 0);
                    assert_eq!(channel.outstanding_segments(), 0);
                }

                assert_eq!(probe.transmissions().len(), codes.len());
            });
        }
    }
}
