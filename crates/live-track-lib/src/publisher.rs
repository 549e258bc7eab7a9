//! Snapshot fan-out
//!
//! Each subscriber owns a queue drained by its own delivery task, so `publish` only ever
//! pushes into queues and never waits for a callback. A stalled subscriber therefore
//! delays nobody but itself.

use crate::Snapshot;
use crate::runtime::{self, lock};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How a subscriber's queue behaves when the subscriber falls behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Unbounded queue: every snapshot is delivered, in order
    #[default]
    Buffered,
    /// Bounded queue: when full, the oldest undelivered snapshot is discarded
    DropOldest { capacity: usize },
}

impl DeliveryPolicy {
    fn capacity(&self) -> Option<usize> {
        match self {
            Self::Buffered => None,
            Self::DropOldest { capacity } => Some((*capacity).max(1)),
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Arc<Snapshot>>,
    closed: bool,
    dropped: u64,
}

/// Per-subscriber mailbox
struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: Option<usize>,
}

impl SubscriberQueue {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn push(&self, snapshot: Arc<Snapshot>) {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            if let Some(capacity) = self.capacity {
                while state.items.len() >= capacity {
                    state.items.pop_front();
                    state.dropped += 1;
                }
            }
            state.items.push_back(snapshot);
        }
        self.notify.notify_one();
    }

    /// Stop accepting snapshots; queued ones are still delivered
    fn close(&self) {
        lock(&self.state).closed = true;
        self.notify.notify_one();
    }

    /// Stop accepting snapshots and discard the queued ones
    fn cancel(&self) {
        {
            let mut state = lock(&self.state);
            state.closed = true;
            state.items.clear();
        }
        self.notify.notify_one();
    }

    async fn next(&self) -> Option<Arc<Snapshot>> {
        loop {
            {
                let mut state = lock(&self.state);
                if let Some(snapshot) = state.items.pop_front() {
                    return Some(snapshot);
                }
                if state.closed {
                    return None;
                }
            }
            // A notification sent between the check above and this await is kept as a
            // permit, so no wakeup is lost.
            self.notify.notified().await;
        }
    }

    fn dropped(&self) -> u64 {
        lock(&self.state).dropped
    }
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<(u64, Arc<SubscriberQueue>)>,
    next_id: u64,
    latest: Option<Arc<Snapshot>>,
    closed: bool,
}

struct Inner {
    policy: DeliveryPolicy,
    registry: Mutex<Registry>,
}

impl Inner {
    fn remove(&self, id: u64) {
        let mut registry = lock(&self.registry);
        if let Some(pos) = registry.subscribers.iter().position(|(sid, _)| *sid == id) {
            let (_, queue) = registry.subscribers.remove(pos);
            queue.cancel();
            tracing::debug!(subscriber = id, "Unsubscribed");
        }
    }
}

/// Delivers snapshots to all current subscribers without blocking the publisher
#[derive(Clone)]
pub struct SnapshotPublisher {
    inner: Arc<Inner>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new(DeliveryPolicy::default())
    }
}

impl SnapshotPublisher {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.inner.policy
    }

    /// Queue `snapshot` for every subscriber. No-op once the publisher is closed.
    pub fn publish(&self, snapshot: Snapshot) {
        #[cfg(feature = "profiling")]
        profiling::scope!("publisher::publish");

        let mut registry = lock(&self.inner.registry);
        if registry.closed {
            tracing::trace!(revision = snapshot.revision, "Publisher closed; snapshot dropped");
            return;
        }
        let snapshot = Arc::new(snapshot);
        for (_, queue) in &registry.subscribers {
            queue.push(snapshot.clone());
        }
        registry.latest = Some(snapshot);
    }

    /// Register `callback` to receive snapshots.
    ///
    /// The callback runs on a dedicated task, receiving the most recent snapshot (if any)
    /// first and then every later one in publication order. Must be called from within a
    /// Tokio runtime. Delivery ends when the returned [`Subscription`] is dropped or the
    /// publisher is closed.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let queue = Arc::new(SubscriberQueue::new(self.inner.policy.capacity()));
        let mut registry = lock(&self.inner.registry);
        let id = registry.next_id;
        registry.next_id += 1;

        if registry.closed {
            queue.close();
            return Subscription {
                id,
                queue,
                publisher: Weak::new(),
                task: None,
            };
        }

        if let Some(latest) = &registry.latest {
            queue.push(latest.clone());
        }
        registry.subscribers.push((id, queue.clone()));
        drop(registry);

        let delivery_queue = queue.clone();
        let task = runtime::spawn(async move {
            while let Some(snapshot) = delivery_queue.next().await {
                callback(&snapshot);
            }
        });
        tracing::debug!(subscriber = id, "Subscribed");

        Subscription {
            id,
            queue,
            publisher: Arc::downgrade(&self.inner),
            task: Some(task),
        }
    }

    /// Stop delivering to `subscription`; snapshots still queued for it are discarded
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.inner.remove(subscription.id);
    }

    /// Refuse further snapshots. Already queued snapshots are still delivered, after which
    /// every delivery task ends.
    pub fn close(&self) {
        let mut registry = lock(&self.inner.registry);
        if registry.closed {
            return;
        }
        registry.closed = true;
        for (_, queue) in registry.subscribers.drain(..) {
            queue.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.registry).closed
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        lock(&self.inner.registry).latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.registry).subscribers.len()
    }
}

/// Handle for one subscriber; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    publisher: Weak<Inner>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshots discarded because this subscriber fell behind (`DropOldest` only)
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Wait until every snapshot queued before the publisher closed has been delivered.
    ///
    /// Only returns once the publisher is closed (or this subscription is cancelled).
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(subscriber = self.id, "Subscriber task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.publisher.upgrade() {
            inner.remove(self.id);
        } else {
            self.queue.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(revision: u64) -> Snapshot {
        Snapshot {
            revision,
            ..Default::default()
        }
    }

    fn collector() -> (
        Arc<Mutex<Vec<u64>>>,
        impl FnMut(&Snapshot) + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: &Snapshot| sink.lock().unwrap().push(s.revision))
    }

    #[tokio::test]
    async fn test_in_order_delivery() {
        let publisher = SnapshotPublisher::default();
        let (seen, callback) = collector();
        let subscription = publisher.subscribe(callback);

        for revision in 1..=100 {
            publisher.publish(snapshot(revision));
        }
        publisher.close();
        subscription.finished().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, (1..=100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_first() {
        let publisher = SnapshotPublisher::default();
        publisher.publish(snapshot(1));
        publisher.publish(snapshot(2));

        let (seen, callback) = collector();
        let subscription = publisher.subscribe(callback);
        publisher.publish(snapshot(3));
        publisher.close();
        subscription.finished().await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_subscriber_does_not_block_publish() {
        let publisher = SnapshotPublisher::default();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (seen, mut record) = collector();
        let subscription = publisher.subscribe(move |s| {
            // Block on the first snapshot until the test lets go
            if s.revision == 1 {
                let _ = release_rx.lock().unwrap().recv();
            }
            record(s);
        });

        let started = std::time::Instant::now();
        for revision in 1..=1_000 {
            publisher.publish(snapshot(revision));
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        publisher.close();
        subscription.finished().await;
        assert_eq!(seen.lock().unwrap().len(), 1_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_oldest_keeps_newest() {
        let publisher = SnapshotPublisher::new(DeliveryPolicy::DropOldest { capacity: 2 });
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (first_tx, first_rx) = tokio::sync::oneshot::channel::<()>();
        let first_tx = Mutex::new(Some(first_tx));
        let (seen, mut record) = collector();
        let subscription = publisher.subscribe(move |s| {
            if let Some(tx) = first_tx.lock().unwrap().take() {
                let _ = tx.send(());
                let _ = release_rx.lock().unwrap().recv();
            }
            record(s);
        });

        publisher.publish(snapshot(1));
        // Wait until revision 1 is being delivered, then overflow the queue
        first_rx.await.unwrap();
        for revision in 2..=10 {
            publisher.publish(snapshot(revision));
        }
        assert_eq!(subscription.dropped(), 7);

        release_tx.send(()).unwrap();
        publisher.close();
        subscription.finished().await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 9, 10]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let publisher = SnapshotPublisher::default();
        let (seen, callback) = collector();
        let subscription = publisher.subscribe(callback);
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.unsubscribe(&subscription);
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(snapshot(1));
        subscription.finished().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let publisher = SnapshotPublisher::default();
        let (_seen, callback) = collector();
        let subscription = publisher.subscribe(callback);
        drop(subscription);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_publisher_ignores_everything() {
        let publisher = SnapshotPublisher::default();
        publisher.publish(snapshot(1));
        publisher.close();
        assert!(publisher.is_closed());

        publisher.publish(snapshot(2));
        assert_eq!(publisher.latest().unwrap().revision, 1);

        let (seen, callback) = collector();
        let subscription = publisher.subscribe(callback);
        subscription.finished().await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
