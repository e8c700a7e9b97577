//! Telemetry Ingest Queue
//!
//! Hand-off from network tasks to the single consumer tick. Producers may be
//! cloned freely and enqueue from any task; the consumer drains everything
//! that has arrived with a non-blocking [`IngestQueue::try_dequeue_all`].
//!
//! The queue is unbounded. Depth is tracked so a stalled consumer shows up
//! in the logs instead of as silent memory growth.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Depth at which a consumer stall is reported
pub const DEFAULT_WARN_DEPTH: usize = 64;

#[derive(Debug)]
struct QueueState {
    depth: AtomicUsize,
    closed: AtomicBool,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    warn_depth: usize,
    /// Set while depth is above the threshold, to warn once per stall
    stalled: AtomicBool,
    stalls: AtomicU64,
}

/// Counters for the ingest queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    /// Times the depth crossed the warning threshold
    pub stalls: u64,
}

/// Producer half; cheap to clone
#[derive(Debug)]
pub struct IngestProducer<T> {
    tx: mpsc::UnboundedSender<T>,
    state: Arc<QueueState>,
}

impl<T> Clone for IngestProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> IngestProducer<T> {
    /// Push one item
    ///
    /// Returns `false` once the queue is closed; the item is discarded.
    pub fn enqueue(&self, item: T) -> bool {
        if self.state.closed.load(Ordering::Acquire) {
            self.state.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // Count before sending so the consumer never observes a negative depth
        let depth = self.state.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(item).is_err() {
            self.state.depth.fetch_sub(1, Ordering::AcqRel);
            self.state.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.state.enqueued.fetch_add(1, Ordering::Relaxed);

        if depth > self.state.warn_depth && !self.state.stalled.swap(true, Ordering::AcqRel) {
            self.state.stalls.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                depth = depth,
                threshold = self.state.warn_depth,
                "Ingest queue backing up; consumer may be stalled"
            );
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

/// Consumer half
#[derive(Debug)]
pub struct IngestQueue<T> {
    rx: mpsc::UnboundedReceiver<T>,
    state: Arc<QueueState>,
    dequeued: u64,
}

impl<T> IngestQueue<T> {
    /// Create a connected producer/consumer pair
    #[allow(clippy::new_ret_no_self)]
    pub fn new(warn_depth: usize) -> (IngestProducer<T>, IngestQueue<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState {
            depth: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            warn_depth,
            stalled: AtomicBool::new(false),
            stalls: AtomicU64::new(0),
        });

        let producer = IngestProducer {
            tx,
            state: Arc::clone(&state),
        };
        let queue = IngestQueue {
            rx,
            state,
            dequeued: 0,
        };
        (producer, queue)
    }

    /// Drain every item enqueued so far, oldest first
    ///
    /// Never blocks; returns an empty vector when nothing is waiting.
    pub fn try_dequeue_all(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }

        if !items.is_empty() {
            self.state.depth.fetch_sub(items.len(), Ordering::AcqRel);
            self.dequeued += items.len() as u64;
            self.state.stalled.store(false, Ordering::Release);
        }
        items
    }

    /// Current number of waiting items
    pub fn len(&self) -> usize {
        self.state.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the depth is above the warning threshold since the last drain
    pub fn is_stalled(&self) -> bool {
        self.state.stalled.load(Ordering::Acquire)
    }

    /// Stop accepting items
    ///
    /// Anything already queued is discarded; later enqueues are no-ops.
    pub fn close(&mut self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        // Producers racing the close undo their own increment
        self.state.depth.fetch_sub(discarded, Ordering::AcqRel);
        self.state.dropped.fetch_add(discarded as u64, Ordering::Relaxed);
        tracing::debug!(discarded = discarded, "Ingest queue closed");
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            enqueued: self.state.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued,
            dropped: self.state.dropped.load(Ordering::Relaxed),
            stalls: self.state.stalls.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_drain_returns_nothing() {
        let (_producer, mut queue) = IngestQueue::<u32>::new(DEFAULT_WARN_DEPTH);
        assert!(queue.try_dequeue_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_takes_everything_once() {
        let (producer, mut queue) = IngestQueue::new(DEFAULT_WARN_DEPTH);
        for i in 0..5 {
            assert!(producer.enqueue(i));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.try_dequeue_all(), vec![0, 1, 2, 3, 4]);
        assert!(queue.try_dequeue_all().is_empty());

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 5);
        assert_eq!(stats.dequeued, 5);
        assert_eq!(stats.depth, 0);
    }

    #[test]
    fn test_close_discards_and_rejects() {
        let (producer, mut queue) = IngestQueue::new(DEFAULT_WARN_DEPTH);
        producer.enqueue("in flight");
        queue.close();

        assert!(producer.is_closed());
        assert!(!producer.enqueue("late"));
        assert!(queue.try_dequeue_all().is_empty());
        assert_eq!(queue.stats().dropped, 2);
    }

    #[test]
    fn test_stall_warns_once_until_drained() {
        let (producer, mut queue) = IngestQueue::new(3);

        for i in 0..3 {
            producer.enqueue(i);
        }
        assert!(!queue.is_stalled());
        assert_eq!(queue.stats().stalls, 0);

        for i in 3..10 {
            producer.enqueue(i);
        }
        assert!(queue.is_stalled());
        assert_eq!(queue.stats().stalls, 1);

        assert_eq!(queue.try_dequeue_all().len(), 10);
        assert!(!queue.is_stalled());

        // A second backlog is a second stall
        for i in 0..5 {
            producer.enqueue(i);
        }
        assert!(queue.is_stalled());
        assert_eq!(queue.stats().stalls, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_racing_producers_leaves_zero_depth() {
        let (producer, mut queue) = IngestQueue::new(DEFAULT_WARN_DEPTH);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let producer = producer.clone();
            handles.push(tokio::spawn(async move {
                let mut accepted = 0u64;
                for i in 0..5_000u32 {
                    if producer.enqueue(i) {
                        accepted += 1;
                    }
                    if i % 500 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                accepted
            }));
        }

        tokio::task::yield_now().await;
        queue.try_dequeue_all();
        queue.close();

        let mut accepted = 0;
        for handle in handles {
            accepted += handle.await.unwrap();
        }
        // A send racing the close may land after the close drained
        queue.try_dequeue_all();

        assert_eq!(queue.len(), 0);
        assert_eq!(queue.stats().enqueued, accepted);
        assert!(!producer.enqueue(0));
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let (producer, mut queue) = IngestQueue::new(4);

        let mut handles = Vec::new();
        for task in 0..4u32 {
            let producer = producer.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250u32 {
                    producer.enqueue((task, i));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let items = queue.try_dequeue_all();
        assert_eq!(items.len(), 1000);

        // Per-producer order is preserved
        for task in 0..4u32 {
            let seq: Vec<u32> = items.iter().filter(|(t, _)| *t == task).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    proptest! {
        #[test]
        fn prop_fifo_without_loss_or_duplication(
            batches in prop::collection::vec(prop::collection::vec(any::<u16>(), 0..20), 1..10)
        ) {
            let (producer, mut queue) = IngestQueue::new(DEFAULT_WARN_DEPTH);
            let mut expected = Vec::new();
            let mut received = Vec::new();

            // Interleave enqueues with drains
            for batch in batches {
                for item in batch {
                    producer.enqueue(item);
                    expected.push(item);
                }
                received.extend(queue.try_dequeue_all());
            }
            received.extend(queue.try_dequeue_all());

            prop_assert_eq!(received, expected);
            prop_assert_eq!(queue.len(), 0);
        }
    }
}
