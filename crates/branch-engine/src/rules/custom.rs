use std::sync::Arc;

use tracing::{debug, warn};

use super::CallRule;
use crate::error::{BranchError, Result};
use crate::model::{Branch, ServicePoint, Visit};

/// External service deciding which visit a service point gets next
pub trait RuleDecisionService: Send + Sync {
    fn decide_visit(&self, branch: &Branch, service_point: &ServicePoint) -> anyhow::Result<Option<Visit>>;
}

/// Call rule delegating the choice to a [`RuleDecisionService`]
///
/// Only the unfiltered call is delegated; the queue-filtered call and the
/// available service points query answer empty.
pub struct CustomCallRule {
    decision: Arc<dyn RuleDecisionService>,
}

impl CustomCallRule {
    pub fn new(decision: Arc<dyn RuleDecisionService>) -> Self {
        Self { decision }
    }
}

impl CallRule for CustomCallRule {
    fn name(&self) -> &'static str {
        "CustomCallRule"
    }

    fn call(&self, branch: &mut Branch, service_point_id: &str) -> Result<Option<Visit>> {
        branch.work_profile_at(service_point_id)?;
        let service_point = branch
            .service_points
            .get(service_point_id)
            .ok_or_else(|| BranchError::not_found(format!("Service point {} not found", service_point_id)))?;

        let Some(decided) = self.decision.decide_visit(branch, service_point)? else {
            debug!("Decision service has nothing for {}", service_point_id);
            return Ok(None);
        };

        // Only a visit this branch actually holds can be handed out.
        let stored = branch
            .queues
            .values_mut()
            .flat_map(|q| q.visits.iter_mut())
            .find(|v| v.id == decided.id);
        match stored {
            Some(stored) => {
                stored.clear_call_hints();
                Ok(Some(stored.clone()))
            }
            None => {
                warn!("⚠️ Decision service chose visit {} which is not waiting in {}", decided.id, branch.id);
                Ok(None)
            }
        }
    }

    fn call_from_queues(&self, _branch: &mut Branch, _service_point_id: &str, _queue_ids: &[String]) -> Result<Option<Visit>> {
        Ok(None)
    }

    fn available_service_points(&self, _branch: &Branch, _visit: &Visit) -> Vec<ServicePoint> {
        Vec::new()
    }
}
