//! Latest-value-wins channel built on `tokio::sync::watch`

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace};

/// Slot contents: publish sequence number and the value
type Slot<T> = (u64, Option<Arc<T>>);

/// Producer side. Publishing never blocks and never fails.
pub struct ResultChannel<T> {
    sender: watch::Sender<Slot<T>>,
}

impl<T> ResultChannel<T> {
    /// Create an empty channel
    pub fn new() -> Self {
        let (sender, _) = watch::channel((0, None));
        Self { sender }
    }

    /// Replace the held value. Consumers that have not read the previous
    /// value yet will only ever see this one.
    pub fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let stored = value.clone();
        self.sender.send_modify(|slot| {
            slot.0 += 1;
            slot.1 = Some(stored);
        });
        trace!(
            "Published result #{} to {} subscriber(s)",
            self.published_count(),
            self.subscriber_count()
        );
        value
    }

    /// Register a consumer. It starts from the value currently held.
    pub fn subscribe(&self) -> Subscription<T> {
        let receiver = self.sender.subscribe();
        let seen = receiver.borrow().0;
        debug!("New result subscriber (total {})", self.sender.receiver_count());
        Subscription { receiver, seen }
    }

    /// Most recent value, if any was published
    pub fn latest(&self) -> Option<Arc<T>> {
        self.sender.borrow().1.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of values published so far
    pub fn published_count(&self) -> u64 {
        self.sender.borrow().0
    }
}

impl<T> Default for ResultChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a [`ResultChannel`]
pub struct Subscription<T> {
    receiver: watch::Receiver<Slot<T>>,
    seen: u64,
}

impl<T> Subscription<T> {
    /// Newest value published since the last `poll`/`recv`, without waiting
    pub fn poll(&mut self) -> Option<Arc<T>> {
        let slot = self.receiver.borrow_and_update();
        if slot.0 == self.seen {
            return None;
        }
        self.seen = slot.0;
        slot.1.clone()
    }

    /// Wait for the next value. Returns `None` once the producer is gone
    /// and nothing unread is left.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        loop {
            if let Some(value) = self.poll() {
                return Some(value);
            }
            if self.receiver.changed().await.is_err() {
                return self.poll();
            }
        }
    }

    /// Current value without marking it as read
    pub fn latest(&self) -> Option<Arc<T>> {
        self.receiver.borrow().1.clone()
    }

    /// Stop receiving
    pub fn unsubscribe(self) {
        debug!("Result subscriber removed");
    }
}
