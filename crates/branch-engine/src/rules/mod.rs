//! # Call rules
//!
//! A call rule decides which waiting visit a service point gets next. All
//! strategies share the [`CallRule`] contract:
//!
//! - [`CallRule::call`] searches every queue reachable through the work
//!   profile of the user bound to the service point;
//! - [`CallRule::call_from_queues`] searches only the given queues;
//! - [`CallRule::available_service_points`] lists the points able to call a
//!   given visit.
//!
//! Calling from a point with no bound user, or whose user has a work
//! profile the branch does not know, is [`BranchError::Forbidden`]. Finding
//! nothing eligible is `Ok(None)`.
//!
//! Strategies are registered in [`CallRules`] under a [`CallRuleKind`]; a
//! branch may name its own kind, otherwise the configured default applies.
//!
//! [`SegmentationRule`] lives here too but routes rather than calls: it
//! picks the queue a visit enters.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BranchError, Result};
use crate::model::{Branch, ServicePoint, Visit};

pub mod custom;
pub mod max_life_time;
pub mod max_waiting_time;
pub mod script;
pub mod segmentation;
pub(crate) mod selection;

pub use custom::{CustomCallRule, RuleDecisionService};
pub use max_life_time::MaxLifeTimeCallRule;
pub use max_waiting_time::MaxWaitingTimeCallRule;
pub use script::{ExpressionEvaluator, ScriptEvaluator};
pub use segmentation::SegmentationRule;

/// Visit selection strategy
pub trait CallRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pick the next visit for `service_point_id` from its reachable queues
    fn call(&self, branch: &mut Branch, service_point_id: &str) -> Result<Option<Visit>>;

    /// Pick the next visit from `queue_ids` only
    fn call_from_queues(&self, branch: &mut Branch, service_point_id: &str, queue_ids: &[String]) -> Result<Option<Visit>>;

    /// Service points able to call `visit`
    fn available_service_points(&self, branch: &Branch, visit: &Visit) -> Vec<ServicePoint>;
}

/// Registered call rule strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRuleKind {
    #[default]
    MaxWaitingTime,
    MaxLifeTime,
    Custom,
}

impl CallRuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallRuleKind::MaxWaitingTime => "max_waiting_time",
            CallRuleKind::MaxLifeTime => "max_life_time",
            CallRuleKind::Custom => "custom",
        }
    }
}

impl fmt::Display for CallRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallRuleKind {
    type Err = BranchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max_waiting_time" => Ok(CallRuleKind::MaxWaitingTime),
            "max_life_time" => Ok(CallRuleKind::MaxLifeTime),
            "custom" => Ok(CallRuleKind::Custom),
            other => Err(BranchError::configuration(format!("Unknown call rule: {}", other))),
        }
    }
}

/// Call rule registry
pub struct CallRules {
    rules: HashMap<CallRuleKind, Arc<dyn CallRule>>,
    default_kind: CallRuleKind,
}

impl CallRules {
    /// Registry with both time-based rules
    pub fn new(default_kind: CallRuleKind) -> Self {
        let mut rules: HashMap<CallRuleKind, Arc<dyn CallRule>> = HashMap::new();
        rules.insert(CallRuleKind::MaxWaitingTime, Arc::new(MaxWaitingTimeCallRule));
        rules.insert(CallRuleKind::MaxLifeTime, Arc::new(MaxLifeTimeCallRule));
        Self { rules, default_kind }
    }

    /// Register the custom rule backed by `decision`
    pub fn with_custom(mut self, decision: Arc<dyn RuleDecisionService>) -> Self {
        self.register(CallRuleKind::Custom, Arc::new(CustomCallRule::new(decision)));
        self
    }

    pub fn register(&mut self, kind: CallRuleKind, rule: Arc<dyn CallRule>) {
        self.rules.insert(kind, rule);
    }

    pub fn default_kind(&self) -> CallRuleKind {
        self.default_kind
    }

    pub fn get(&self, kind: CallRuleKind) -> Result<Arc<dyn CallRule>> {
        self.rules
            .get(&kind)
            .cloned()
            .ok_or_else(|| BranchError::configuration(format!("Call rule {} is not registered", kind)))
    }

    /// Rule named by the branch, else the default
    pub fn for_branch(&self, branch: &Branch) -> Result<Arc<dyn CallRule>> {
        self.get(branch.call_rule.unwrap_or(self.default_kind))
    }
}
