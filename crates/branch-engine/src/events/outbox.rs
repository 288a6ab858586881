use serde::Serialize;
use serde_json::{json, Value};

use super::notification::{ChangedObject, Notification, BROADCAST, CONFIG, FRONTEND, STAT};
use crate::error::{BranchError, ErrorKind};
use crate::model::{Visit, VisitEvent};

/// Notification waiting to be dispatched to a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub channel: &'static str,
    pub notification: Notification,
}

/// Ordered notifications produced by a state transition
///
/// Aggregate methods only fill an outbox; dispatching it is left to the
/// service layer, after the transition has been committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    items: Vec<Pending>,
}

/// Event type of configuration audit records
pub const ENTITY_CHANGED: &str = "ENTITY_CHANGED";

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: &'static str, notification: Notification) {
        self.items.push(Pending {
            channel,
            notification,
        });
    }

    /// The broadcast, statistics and frontend triple for a visit event
    pub fn visit_event(&mut self, event: VisitEvent, visit: &Visit) {
        let body = to_value(visit);
        for channel in [BROADCAST, STAT, FRONTEND] {
            self.push(
                channel,
                Notification::new(event.notification_name(), body.clone())
                    .with_param("branchId", visit.branch_id.clone())
                    .with_param("visitId", visit.id.clone()),
            );
        }
    }

    /// Same body on broadcast, statistics and frontend
    pub fn broadcast_stat_frontend(&mut self, event_type: &str, body: Value) {
        for channel in [BROADCAST, STAT, FRONTEND] {
            self.push(channel, Notification::new(event_type, body.clone()));
        }
    }

    /// `ENTITY_CHANGED` audit record on the config channel
    pub fn changed<T: Serialize>(
        &mut self,
        class_name: &str,
        action: &str,
        old_value: Option<&T>,
        new_value: Option<&T>,
    ) {
        let changed = ChangedObject {
            old_value: old_value.map(to_value).unwrap_or(Value::Null),
            new_value: new_value.map(to_value).unwrap_or(Value::Null),
            action: action.to_string(),
            class_name: class_name.to_string(),
        };
        self.push(CONFIG, Notification::new(ENTITY_CHANGED, to_value(&changed)));
    }

    pub fn business_error(&mut self, err: &BranchError) {
        self.push(
            BROADCAST,
            Notification::new(
                "BUSINESS_ERROR",
                json!({ "kind": format!("{:?}", err.kind()), "message": err.message() }),
            ),
        );
    }

    pub fn system_error(&mut self, message: &str) {
        self.push(
            BROADCAST,
            Notification::new("SYSTEM_ERROR", json!({ "message": message })),
        );
    }

    /// Outbox of a rejected operation: a single `SYSTEM_ERROR` for system
    /// failures, otherwise a single `BUSINESS_ERROR`
    pub fn rejected(err: &BranchError) -> Self {
        let mut outbox = Self::new();
        match err.kind() {
            ErrorKind::System => outbox.system_error(err.message()),
            _ => outbox.business_error(err),
        }
        outbox
    }

    pub fn append(&mut self, mut other: Outbox) {
        self.items.append(&mut other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pending> {
        self.items.iter()
    }

    pub fn event_types(&self) -> Vec<&str> {
        self.items.iter().map(|p| p.notification.event_type.as_str()).collect()
    }
}

impl IntoIterator for Outbox {
    type Item = Pending;
    type IntoIter = std::vec::IntoIter<Pending>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
