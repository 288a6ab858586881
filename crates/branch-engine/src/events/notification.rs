use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Broadcast channel, seen by every consumer
pub const BROADCAST: &str = "*";
/// Analytics channel
pub const STAT: &str = "stat";
/// User interface channel
pub const FRONTEND: &str = "frontend";
/// Configuration-change audit channel
pub const CONFIG: &str = "config";

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub event_type: String,
    pub event_date: DateTime<Utc>,
    /// Filled in by the publisher from the configured application name
    #[serde(default)]
    pub sender_service: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl Notification {
    pub fn new(event_type: impl Into<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            event_date: Utc::now(),
            sender_service: String::new(),
            params: HashMap::new(),
            body,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Body of configuration-audit notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedObject {
    pub old_value: Value,
    pub new_value: Value,
    pub action: String,
    pub class_name: String,
}
