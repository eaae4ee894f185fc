// Lock-free communication channels

use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

use crate::messaging::command::MetronomeCommand;
use crate::messaging::notification::Notification;

pub type CommandProducer = ringbuf::HeapProd<MetronomeCommand>;
pub type CommandConsumer = ringbuf::HeapCons<MetronomeCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<MetronomeCommand>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Default queue size per subscriber
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Fan-out of notifications to any number of subscribers, each with its own
/// bounded queue. A full queue drops the notification for that subscriber only.
pub struct NotificationBus {
    subscribers: Vec<NotificationProducer>,
    capacity: usize,
    dropped: u64,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// New subscriber; it only sees notifications published from now on
    pub fn subscribe(&mut self) -> NotificationConsumer {
        let (producer, consumer) = create_notification_channel(self.capacity);
        self.subscribers.push(producer);
        consumer
    }

    /// Deliver to every subscriber; returns how many queues accepted it
    pub fn publish(&mut self, notification: Notification) -> usize {
        let mut delivered = 0;
        for subscriber in self.subscribers.iter_mut() {
            if subscriber.try_push(notification).is_ok() {
                delivered += 1;
            } else {
                self.dropped += 1;
                log::warn!("notification queue full, {} dropped", notification.kind());
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Notifications lost to full queues
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscribers.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped)
            .finish()
    }
}
