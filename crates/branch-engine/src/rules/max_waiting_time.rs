use chrono::{DateTime, Utc};
use tracing::debug;

use super::selection::{self, Metric};
use super::CallRule;
use crate::error::Result;
use crate::model::{Branch, ServicePoint, Visit};

/// Calls the visit that has waited longest in its current queue
///
/// Waiting time restarts whenever the visit is returned or transferred,
/// so a visit that has been bounced around competes on its latest leg only.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxWaitingTimeCallRule;

fn waiting_time(visit: &Visit, now: DateTime<Utc>) -> i64 {
    visit.waiting_time(now)
}

const METRIC: Metric = waiting_time;

impl CallRule for MaxWaitingTimeCallRule {
    fn name(&self) -> &'static str {
        "MaxWaitingTimeCallRule"
    }

    fn call(&self, branch: &mut Branch, service_point_id: &str) -> Result<Option<Visit>> {
        let queue_ids = branch.work_profile_at(service_point_id)?.queue_ids.clone();
        let picked = selection::select(branch, &queue_ids, Utc::now(), METRIC);
        debug!(
            "⏱️ {} picked {:?} for {}",
            self.name(),
            picked.as_ref().map(|v| v.ticket.as_str()),
            service_point_id
        );
        Ok(picked)
    }

    fn call_from_queues(&self, branch: &mut Branch, service_point_id: &str, queue_ids: &[String]) -> Result<Option<Visit>> {
        branch.work_profile_at(service_point_id)?;
        Ok(selection::select(branch, queue_ids, Utc::now(), METRIC))
    }

    fn available_service_points(&self, branch: &Branch, visit: &Visit) -> Vec<ServicePoint> {
        visit
            .current_queue_link()
            .map(|queue_id| selection::service_points_reaching(branch, queue_id))
            .unwrap_or_default()
    }
}
