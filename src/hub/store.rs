//! Broadcast hub implementation
//!
//! The registry of subscriber channels plus the fan-out that feeds them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::sample::Sample;
use crate::stats::HubMetrics;

use super::channel::{PushOutcome, SubscriberChannel};

/// Identifier of a registered subscriber
pub type SubscriberId = u64;

/// Fan-out point for every sample in the stream
///
/// `broadcast` takes the registry read lock, so concurrent broadcasts proceed
/// in parallel while `subscribe`/`unsubscribe` briefly take the write lock. A
/// removal therefore lands entirely before or entirely after any broadcast.
pub struct TelemetryHub {
    /// Registered channels by subscriber id
    channels: RwLock<HashMap<SubscriberId, Arc<SubscriberChannel>>>,

    next_id: AtomicU64,

    /// Capacity given to new channels
    capacity: usize,

    metrics: Arc<HubMetrics>,
}

impl TelemetryHub {
    /// Create a hub whose subscribers buffer up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, Arc::new(HubMetrics::new()))
    }

    /// Create a hub that reports into shared metrics
    pub fn with_metrics(capacity: usize, metrics: Arc<HubMetrics>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Capacity of each subscriber queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    /// Register a new subscriber
    ///
    /// The returned subscription unsubscribes itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(SubscriberChannel::new(self.capacity));

        let count = {
            let mut channels = self.channels.write();
            channels.insert(id, Arc::clone(&channel));
            channels.len()
        };

        tracing::debug!(subscriber = id, subscribers = count, "Subscriber added");

        Subscription {
            id,
            channel,
            hub: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber
    ///
    /// Returns whether it was registered. Unknown or already removed ids are
    /// ignored.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.channels.write().remove(&id);

        match removed {
            Some(channel) => {
                channel.close();
                tracing::debug!(
                    subscriber = id,
                    subscribers = self.subscriber_count(),
                    dropped = channel.dropped(),
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver a sample to every registered subscriber
    ///
    /// Never waits on a consumer: full queues drop their oldest sample.
    /// Returns the number of subscribers reached.
    pub fn broadcast(&self, sample: &Sample) -> usize {
        let channels = self.channels.read();

        let mut delivered = 0u64;
        let mut displaced = 0u64;
        for channel in channels.values() {
            match channel.push(sample.clone()) {
                PushOutcome::Delivered => delivered += 1,
                PushOutcome::Displaced => {
                    delivered += 1;
                    displaced += 1;
                }
                PushOutcome::Closed => {}
            }
        }
        drop(channels);

        self.metrics.record_broadcast(delivered, displaced);
        delivered as usize
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Check whether a subscriber is registered
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.channels.read().contains_key(&id)
    }
}

/// A subscriber's handle on its channel
///
/// The hub owns the channel's registration; this handle only drains it.
pub struct Subscription {
    id: SubscriberId,
    channel: Arc<SubscriberChannel>,
    hub: Weak<TelemetryHub>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next sample; `None` after unsubscribe once drained
    pub async fn recv(&self) -> Option<Sample> {
        self.channel.recv().await
    }

    /// Take the next sample if one is queued
    pub fn try_recv(&self) -> Option<Sample> {
        self.channel.try_recv()
    }

    /// Queued samples, oldest first, without consuming them
    pub fn pending(&self) -> Vec<Sample> {
        self.channel.snapshot()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.channel.capacity()
    }

    /// Samples this subscriber lost to overflow
    pub fn dropped(&self) -> u64 {
        self.channel.dropped()
    }

    /// Whether the subscription has been removed from the hub
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("len", &self.channel.len())
            .field("capacity", &self.channel.capacity())
            .finish()
    }
}
