//! Single-consumer event channels with an explicit overflow policy.

use futures_util::Stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// What happens when a bounded channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Never drop. Used for terminal outcomes.
    Unbounded,
    /// Keep the newest `n` items.
    DropOldest(usize),
}

struct Shared<T> {
    queue: VecDeque<T>,
    policy: Overflow,
    receiver_taken: bool,
    closed: bool,
}

/// Sending half of a buffered channel. Clones share the same buffer.
///
/// Items sent before the receiver is taken are buffered, so a consumer that
/// subscribes late still sees them.
pub struct EventChannel<T> {
    shared: Arc<Mutex<Shared<T>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T> std::fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("EventChannel")
            .field("policy", &shared.policy)
            .field("buffered", &shared.queue.len())
            .field("closed", &shared.closed)
            .finish()
    }
}

impl<T> EventChannel<T> {
    pub fn new(policy: Overflow) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                queue: VecDeque::new(),
                policy,
                receiver_taken: false,
                closed: false,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Overflow::Unbounded)
    }

    pub fn drop_oldest(capacity: usize) -> Self {
        Self::new(Overflow::DropOldest(capacity.max(1)))
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffers an item. Returns `false` when the channel is closed.
    pub fn send(&self, item: T) -> bool {
        {
            let mut shared = self.lock();
            if shared.closed {
                return false;
            }
            if let Overflow::DropOldest(capacity) = shared.policy {
                while shared.queue.len() >= capacity {
                    shared.queue.pop_front();
                }
            }
            shared.queue.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Hands out the only receiver. Later calls return `None`.
    pub fn take_receiver(&self) -> Option<EventReceiver<T>> {
        let mut shared = self.lock();
        if shared.receiver_taken {
            return None;
        }
        shared.receiver_taken = true;
        Some(EventReceiver {
            channel: self.clone(),
        })
    }

    /// Stops accepting items. Buffered items are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EventReceiver<T> {
    channel: EventChannel<T>,
}

impl<T> EventReceiver<T> {
    /// Waits for the next item. `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut shared = self.channel.lock();
                if let Some(item) = shared.queue.pop_front() {
                    return Some(item);
                }
                if shared.closed {
                    return None;
                }
            }
            self.channel.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.channel.lock().queue.pop_front()
    }

    /// Drains everything currently buffered.
    pub fn drain(&mut self) -> Vec<T> {
        self.channel.lock().queue.drain(..).collect()
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures_util::stream::unfold(self, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_items_sent_before_subscription_are_kept() {
        let channel = EventChannel::unbounded();
        channel.send(1);
        channel.send(2);

        let mut rx = channel.take_receiver().unwrap();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let channel = EventChannel::drop_oldest(2);
        for i in 0..5 {
            channel.send(i);
        }
        let mut rx = channel.take_receiver().unwrap();
        assert_eq!(rx.drain(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_single_consumer() {
        let channel = EventChannel::<u8>::unbounded();
        assert!(channel.take_receiver().is_some());
        assert!(channel.take_receiver().is_none());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let channel = EventChannel::unbounded();
        channel.send("a");
        channel.close();
        assert!(!channel.send("b"));

        let items: Vec<_> = channel.take_receiver().unwrap().into_stream().collect().await;
        assert_eq!(items, vec!["a"]);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let channel = EventChannel::unbounded();
        let mut rx = channel.take_receiver().unwrap();
        let sender = channel.clone();
        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        sender.send(7);
        assert_eq!(handle.await.unwrap(), Some(7));
    }
}
