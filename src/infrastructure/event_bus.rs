//! In-process publish/subscribe for typed events.
//!
//! Each subscriber gets its own unbounded queue, so publishing never waits on
//! a slow consumer and one subscriber going away does not affect the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription<E> {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }
}

struct Subscribers<E> {
    senders: Vec<(SubscriptionId, mpsc::UnboundedSender<E>)>,
}

pub struct EventBus<E> {
    subscribers: Arc<Mutex<Subscribers<E>>>,
    next_id: Arc<AtomicU64>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                senders: Vec::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.senders.push((id, sender));
        }
        Subscription { id, receiver }
    }

    /// Stop delivery to `id`. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subs) = self.subscribers.lock() else {
            return false;
        };
        let before = subs.senders.len();
        subs.senders.retain(|(sub_id, _)| *sub_id != id);
        subs.senders.len() != before
    }

    /// Deliver to every live subscriber; returns how many received it.
    pub fn publish(&self, event: E) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            return 0;
        };
        // Closed receivers are pruned as they are found.
        subs.senders
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
        trace!("Published event to {} subscribers", subs.senders.len());
        subs.senders.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.senders.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(1), 2);
        assert_eq!(bus.publish(2), 2);

        assert_eq!(a.try_recv(), Some(1));
        assert_eq!(a.try_recv(), Some(2));
        assert_eq!(b.try_recv(), Some(1));
        assert_eq!(b.try_recv(), Some(2));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert!(bus.unsubscribe(a.id()));
        assert!(!bus.unsubscribe(a.id()));

        bus.publish("hello");
        assert_eq!(a.try_recv(), None);
        assert_eq!(b.try_recv(), Some("hello"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let dropped = bus.subscribe();
        let mut slow = bus.subscribe();
        drop(dropped);

        // Nobody reads `slow` while we publish a backlog.
        for i in 0..1000 {
            bus.publish(i);
        }
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(slow.try_recv(), Some(0));
    }

    #[tokio::test]
    async fn test_recv_async() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(42u32);
        });
        assert_eq!(sub.recv().await, Some(42));
    }
}
