//! Per-subscriber delivery queue
//!
//! A bounded FIFO with drop-oldest overflow. The producer side never waits:
//! when the queue is full the oldest sample is evicted and the new one is
//! appended under the same lock, so the drainer never observes a queue that
//! is over capacity or missing both samples.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::sample::Sample;

/// Result of offering a sample to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without eviction
    Delivered,
    /// Appended after evicting the oldest sample
    Displaced,
    /// Channel was unsubscribed; nothing changed
    Closed,
}

#[derive(Debug)]
struct ChannelState {
    queue: VecDeque<Sample>,
    closed: bool,
}

/// Bounded drop-oldest queue owned by the registry
#[derive(Debug)]
pub struct SubscriberChannel {
    state: Mutex<ChannelState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl SubscriberChannel {
    /// Create a channel holding at most `capacity` samples (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples evicted by overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueue a sample, evicting the oldest one if the queue is full
    pub(crate) fn push(&self, sample: Sample) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let outcome = if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                PushOutcome::Displaced
            } else {
                PushOutcome::Delivered
            };
            state.queue.push_back(sample);
            outcome
        };

        if outcome == PushOutcome::Displaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        outcome
    }

    /// Stop accepting samples; buffered samples stay readable
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Pop the oldest sample without waiting
    pub fn try_recv(&self) -> Option<Sample> {
        self.state.lock().queue.pop_front()
    }

    /// Wait for the next sample
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<Sample> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(sample) = state.queue.pop_front() {
                    return Some(sample);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit when nobody waits, so a push between
            // the check above and this await is not lost
            self.notify.notified().await;
        }
    }

    /// Copy of the queued samples, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.state.lock().queue.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn sample(t: f64) -> Sample {
        Sample::reading(t, vec![t])
    }

    fn timestamps(samples: &[Sample]) -> Vec<f64> {
        samples.iter().filter_map(Sample::timestamp).collect()
    }

    #[test]
    fn test_push_within_capacity() {
        let channel = SubscriberChannel::new(3);

        assert_eq!(channel.push(sample(1.0)), PushOutcome::Delivered);
        assert_eq!(channel.push(sample(2.0)), PushOutcome::Delivered);

        assert_eq!(channel.len(), 2);
        assert_eq!(channel.dropped(), 0);
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let channel = SubscriberChannel::new(2);

        channel.push(sample(1.0));
        channel.push(sample(2.0));
        assert_eq!(channel.push(sample(3.0)), PushOutcome::Displaced);

        assert_eq!(channel.len(), 2);
        assert_eq!(channel.dropped(), 1);
        assert_eq!(timestamps(&channel.snapshot()), vec![2.0, 3.0]);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let channel = SubscriberChannel::new(5);

        for i in 0..50 {
            channel.push(sample(i as f64));
            assert!(channel.len() <= 5);
        }

        assert_eq!(channel.dropped(), 45);
        assert_eq!(timestamps(&channel.snapshot()), vec![45.0, 46.0, 47.0, 48.0, 49.0]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let channel = SubscriberChannel::new(0);
        assert_eq!(channel.capacity(), 1);

        channel.push(sample(1.0));
        channel.push(sample(2.0));
        assert_eq!(timestamps(&channel.snapshot()), vec![2.0]);
    }

    #[test]
    fn test_closed_channel_rejects_push() {
        let channel = SubscriberChannel::new(2);
        channel.push(sample(1.0));
        channel.close();

        assert_eq!(channel.push(sample(2.0)), PushOutcome::Closed);
        assert_eq!(timestamps(&channel.snapshot()), vec![1.0]);
    }

    #[test]
    fn test_recv_pending_until_push() {
        let channel = SubscriberChannel::new(2);
        let mut recv = tokio_test::task::spawn(channel.recv());

        tokio_test::assert_pending!(recv.poll());
        channel.push(sample(1.0));

        assert!(recv.is_woken());
        let received = tokio_test::assert_ready!(recv.poll());
        assert_eq!(received.and_then(|s| s.timestamp()), Some(1.0));
    }

    #[test]
    fn test_close_wakes_receiver() {
        let channel = SubscriberChannel::new(2);
        let mut recv = tokio_test::task::spawn(channel.recv());

        tokio_test::assert_pending!(recv.poll());
        channel.close();

        assert!(recv.is_woken());
        assert!(tokio_test::assert_ready!(recv.poll()).is_none());
    }

    #[tokio::test]
    async fn test_recv_drains_then_ends_after_close() {
        let channel = SubscriberChannel::new(4);
        channel.push(sample(1.0));
        channel.push(sample(2.0));
        channel.close();

        assert_eq!(channel.recv().await.and_then(|s| s.timestamp()), Some(1.0));
        assert_eq!(channel.recv().await.and_then(|s| s.timestamp()), Some(2.0));
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let channel = Arc::new(SubscriberChannel::new(4));

        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.push(sample(7.0));

        let received = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.and_then(|s| s.timestamp()), Some(7.0));
    }
}
