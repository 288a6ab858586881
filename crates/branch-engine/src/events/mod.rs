//! Engine notifications: channels, payloads, outbox and publishers.
//!
//! Domain transitions describe what happened by filling an [`Outbox`]; the
//! service layer hands that outbox to a [`NotificationPublisher`] once the
//! transition has been committed (or rolled back).

pub mod notification;
pub mod outbox;
pub mod publisher;

pub use notification::{ChangedObject, Notification, BROADCAST, CONFIG, FRONTEND, STAT};
pub use outbox::{Outbox, Pending, ENTITY_CHANGED};
pub use publisher::{EventBus, EventStats, NotificationPublisher, NullPublisher, PublishedNotification};

use crate::config::EventsConfig;

/// Hand every pending notification to `publisher`, in order
pub fn dispatch(publisher: &dyn NotificationPublisher, events: &EventsConfig, outbox: Outbox) {
    for pending in outbox {
        let critical = events.is_critical(pending.channel);
        publisher.publish(pending.channel, critical, pending.notification);
    }
}
