use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::script::{ExpressionEvaluator, ScriptEvaluator};
use crate::error::{BranchError, Result};
use crate::model::{Branch, Queue, SegmentationRuleData, Visit};

/// Routes a visit to a queue when it is created or moves on to its next
/// service
///
/// Property rules of the current service's group are tried first (in rule
/// id order, and only when the visit carries parameters), then the group's
/// script rule, then the service's own linked queue.
pub struct SegmentationRule {
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl Default for SegmentationRule {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator))
    }
}

impl SegmentationRule {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Queue for the visit's current service; `None` when nothing applies
    pub fn get_queue<'a>(&self, visit: &Visit, branch: &'a Branch) -> Result<Option<&'a Queue>> {
        let Some(service) = visit.current_service.as_ref() else {
            return Ok(None);
        };

        // The branch record is authoritative for group membership.
        let group = branch
            .services
            .get(&service.id)
            .and_then(|s| s.service_group_id.as_ref())
            .or(service.service_group_id.as_ref())
            .and_then(|g| branch.service_groups.get(g))
            .filter(|g| g.service_ids.contains(&service.id));

        if let Some(group) = group {
            if let Some(queue) = self.match_properties(visit, branch, &group.id) {
                debug!("🧭 Visit {} segmented to {} by property rule", visit.id, queue.id);
                return Ok(Some(queue));
            }

            if let Some(rule_id) = group.segmentation_rule_id.as_deref().filter(|r| !r.is_empty()) {
                let by_script = self
                    .get_queue_by_rule(visit, branch, rule_id)
                    .map_err(|e| BranchError::system(format!("Segmentation rule {} failed: {}", rule_id, e.message())))?;
                if let Some(queue) = by_script {
                    debug!("🧭 Visit {} segmented to {} by script {}", visit.id, queue.id, rule_id);
                    return Ok(Some(queue));
                }
            }
        }

        Ok(service
            .linked_queue_id
            .as_ref()
            .and_then(|q| branch.queues.get(q)))
    }

    fn match_properties<'a>(&self, visit: &Visit, branch: &'a Branch, group_id: &str) -> Option<&'a Queue> {
        if visit.parameter_map.is_empty() {
            return None;
        }
        let mut rules: Vec<&SegmentationRuleData> = branch
            .segmentation_rules
            .values()
            .filter(|r| r.service_group_id.as_deref().is_none_or(|g| g == group_id))
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        rules
            .into_iter()
            .find(|r| r.matches(&visit.parameter_map))
            .and_then(|r| branch.queues.get(&r.queue_id))
    }

    /// Queue chosen by the branch's script rule `rule_id`
    ///
    /// The script gets `visit` and `branch` bindings and must produce a
    /// `queue` output: `null`, a queue id, or an object with an `id`. Any
    /// evaluation failure becomes [`BranchError::System`].
    pub fn get_queue_by_rule<'a>(&self, visit: &Visit, branch: &'a Branch, rule_id: &str) -> Result<Option<&'a Queue>> {
        let rule = branch
            .custom_segmentation_rules
            .get(rule_id)
            .ok_or_else(|| BranchError::not_found(format!("Segmentation rule {} not found", rule_id)))?;

        if !(rule.declares_input("visit") && rule.declares_input("branch")) {
            return Err(BranchError::system(format!(
                "Segmentation rule {} must declare 'visit' and 'branch' inputs",
                rule_id
            )));
        }

        let mut inputs = HashMap::new();
        inputs.insert("visit".to_string(), serialize(visit)?);
        inputs.insert("branch".to_string(), serialize(branch)?);

        let outputs = self.evaluator.evaluate(&rule.script, &inputs).map_err(|e| {
            warn!("💥 Script {} failed for visit {}: {:#}", rule_id, visit.id, e);
            BranchError::from(e)
        })?;

        let queue_id = match outputs.get("queue") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(id)) => id.clone(),
            Some(Value::Object(obj)) => match obj.get("id") {
                Some(Value::String(id)) => id.clone(),
                _ => return Err(BranchError::system(format!("Script {} returned a queue without id", rule_id))),
            },
            Some(other) => {
                return Err(BranchError::system(format!(
                    "Script {} returned an unusable queue value {}",
                    rule_id, other
                )));
            }
        };

        branch
            .queues
            .get(&queue_id)
            .map(Some)
            .ok_or_else(|| BranchError::system(format!("Script {} chose unknown queue {}", rule_id, queue_id)))
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BranchError::system(format!("Cannot serialize script input: {}", e)))
}
