//! Notification sinks.
//!
//! Publishing never fails and never blocks the caller: a notification that
//! nobody listens to is dropped after being recorded in the history.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::notification::Notification;
use crate::config::BranchEngineConfig;

/// Sink for engine notifications
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, channel: &str, critical: bool, notification: Notification);
}

/// A notification as delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedNotification {
    pub channel: String,
    pub critical: bool,
    pub notification: Notification,
}

/// Counters kept by the [`EventBus`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub total_published: u64,
    pub by_channel: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    /// Sends that found no live subscriber
    pub undelivered: u64,
}

/// In-process publisher backed by a broadcast channel and a bounded history
pub struct EventBus {
    sender: broadcast::Sender<PublishedNotification>,
    history: RwLock<VecDeque<PublishedNotification>>,
    stats: RwLock<EventStats>,
    max_history_size: usize,
    sender_service: String,
}

impl EventBus {
    pub fn new(sender_service: impl Into<String>, broadcast_capacity: usize, max_history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(max_history_size.min(1024))),
            stats: RwLock::new(EventStats::default()),
            max_history_size: max_history_size.max(1),
            sender_service: sender_service.into(),
        }
    }

    pub fn from_config(config: &BranchEngineConfig) -> Self {
        Self::new(
            config.general.application_name.clone(),
            config.events.broadcast_capacity,
            config.events.history_size,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedNotification> {
        self.sender.subscribe()
    }

    /// Everything still held in the history, oldest first
    pub fn history(&self) -> Vec<PublishedNotification> {
        self.history.read().iter().cloned().collect()
    }

    pub fn history_for(&self, channel: &str) -> Vec<PublishedNotification> {
        self.history
            .read()
            .iter()
            .filter(|p| p.channel == channel)
            .cloned()
            .collect()
    }

    /// Event types in the history, oldest first
    pub fn event_types(&self) -> Vec<String> {
        self.history
            .read()
            .iter()
            .map(|p| p.notification.event_type.clone())
            .collect()
    }

    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }
}

impl NotificationPublisher for EventBus {
    fn publish(&self, channel: &str, critical: bool, mut notification: Notification) {
        if notification.sender_service.is_empty() {
            notification.sender_service = self.sender_service.clone();
        }

        let published = PublishedNotification {
            channel: channel.to_string(),
            critical,
            notification,
        };

        {
            let mut history = self.history.write();
            history.push_back(published.clone());
            while history.len() > self.max_history_size {
                history.pop_front();
            }
        }

        let event_type = published.notification.event_type.clone();
        let delivered = self.sender.send(published).is_ok();

        let mut stats = self.stats.write();
        stats.total_published += 1;
        *stats.by_channel.entry(channel.to_string()).or_insert(0) += 1;
        *stats.by_type.entry(event_type.clone()).or_insert(0) += 1;
        if !delivered {
            stats.undelivered += 1;
            debug!("📭 No subscribers for {} on channel '{}'", event_type, channel);
        }
    }
}

/// Publisher that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl NotificationPublisher for NullPublisher {
    fn publish(&self, channel: &str, _critical: bool, notification: Notification) {
        trace!("Dropping {} for channel '{}'", notification.event_type, channel);
    }
}
