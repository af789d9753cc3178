// Lock-free channels from the engine to a UI

use crate::messaging::notification::Notification;
use crate::messaging::progress::ProgressSnapshot;
use ringbuf::{HeapRb, traits::Split};

pub type ProgressProducer = ringbuf::HeapProd<ProgressSnapshot>;
pub type ProgressConsumer = ringbuf::HeapCons<ProgressSnapshot>;

pub fn create_progress_channel(capacity: usize) -> (ProgressProducer, ProgressConsumer) {
    let rb = HeapRb::<ProgressSnapshot>::new(capacity);
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
