//! Static branch catalog: services, groups, work profiles and routing rules.
//!
//! These records are replaced wholesale by configuration publishing or the
//! configuration-editing operations; visits carry [`Service`] snapshots, not
//! references, so editing the catalog never silently rewrites history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A service a customer can ask for, linked to the queue that normally
/// serves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    /// Service level for serving time, in seconds
    #[serde(default)]
    pub serving_sl: u32,
    /// Queue the visit lands in when no segmentation rule matches
    pub linked_queue_id: Option<String>,
    #[serde(default)]
    pub service_group_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub branch_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>, linked_queue_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            serving_sl: 0,
            linked_queue_id: Some(linked_queue_id.into()),
            service_group_id: None,
            is_available: true,
            branch_id: None,
        }
    }

    pub fn with_serving_sl(mut self, seconds: u32) -> Self {
        self.serving_sl = seconds;
        self
    }
}

/// Group of services sharing segmentation rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub service_ids: Vec<String>,
    /// Script rule consulted when no property rule of the group matches
    #[serde(default)]
    pub segmentation_rule_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl ServiceGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, service_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service_ids,
            segmentation_rule_id: None,
            branch_id: None,
        }
    }
}

/// Ordered set of queues a member of staff may pull visits from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub queue_ids: Vec<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl WorkProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            queue_ids: Vec::new(),
            branch_id: None,
        }
    }

    pub fn with_queue(mut self, queue_id: impl Into<String>) -> Self {
        let queue_id = queue_id.into();
        if !self.queue_ids.contains(&queue_id) {
            self.queue_ids.push(queue_id);
        }
        self
    }

    pub fn reaches(&self, queue_id: &str) -> bool {
        self.queue_ids.iter().any(|q| q == queue_id)
    }
}

/// Property-match routing rule
///
/// Fires for a visit whose current service belongs to `service_group_id`
/// (or for any visit when the group is unset) and whose parameter map
/// contains every `visit_property` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationRuleData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub service_group_id: Option<String>,
    pub queue_id: String,
    #[serde(default)]
    pub visit_property: HashMap<String, String>,
}

impl SegmentationRuleData {
    pub fn new(id: impl Into<String>, service_group_id: impl Into<String>, queue_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            service_group_id: Some(service_group_id.into()),
            queue_id: queue_id.into(),
            visit_property: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.visit_property.insert(key.into(), value.into());
        self
    }

    /// Every required property is present in `parameters` with an equal value
    pub fn matches(&self, parameters: &HashMap<String, String>) -> bool {
        self.visit_property
            .iter()
            .all(|(key, value)| parameters.get(key) == Some(value))
    }
}

/// Script-backed rule definition handed to the script evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub script: String,
    /// Names of the input bindings the script expects
    #[serde(default)]
    pub input_parameters: Vec<String>,
    /// Names of the output bindings the script produces
    #[serde(default)]
    pub output_parameters: Vec<String>,
}

impl ScriptRule {
    pub fn new(id: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            script: script.into(),
            input_parameters: vec!["visit".to_string(), "branch".to_string()],
            output_parameters: vec!["queue".to_string()],
        }
    }

    pub fn declares_input(&self, name: &str) -> bool {
        self.input_parameters.iter().any(|p| p == name)
    }
}

/// Mark or note attached to a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub mark_date: Option<DateTime<Utc>>,
}

impl Mark {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            value: value.into(),
            mark_date: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
