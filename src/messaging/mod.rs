// Engine-to-UI messaging

pub mod channels;
pub mod notification;
pub mod progress;

pub use channels::{
    NotificationConsumer, NotificationProducer, ProgressConsumer, ProgressProducer,
    create_notification_channel, create_progress_channel,
};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
pub use progress::ProgressSnapshot;
