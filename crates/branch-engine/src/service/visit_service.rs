//! Staff-facing visit operations.
//!
//! Every operation is one serialized read-modify-write over a single branch
//! (see [`BranchService::with_branch_mut`]) that ends in
//! [`Branch::update_visit`], or in [`Branch::annotate_current_visit`] for
//! edits that leave the visit where it is. All checks run against a working copy of the
//! visit, so a rejected operation leaves the branch untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::branch_service::BranchService;
use crate::error::{BranchError, Result};
use crate::events::Outbox;
use crate::model::{
    Branch, Mark, Placement, PlacementTarget, Queue, Service, ServicePoint, Visit, VisitEvent, VisitState,
    LAST_QUEUE_ID,
};
use crate::rules::{CallRules, SegmentationRule};

pub struct VisitService {
    branches: Arc<BranchService>,
    rules: Arc<CallRules>,
}

impl VisitService {
    pub fn new(branches: Arc<BranchService>, rules: Arc<CallRules>) -> Self {
        Self { branches, rules }
    }

    pub fn branches(&self) -> &Arc<BranchService> {
        &self.branches
    }

    pub fn rules(&self) -> &CallRules {
        &self.rules
    }

    /// Create a visit for `service_ids` and queue it
    ///
    /// The first service becomes current; segmentation picks the queue and
    /// the queue's counter numbers the ticket.
    pub fn create_visit(
        &self,
        branch_id: &str,
        service_ids: &[String],
        parameters: HashMap<String, String>,
    ) -> Result<Visit> {
        if service_ids.is_empty() {
            return Err(BranchError::invalid_input("A visit needs at least one service"));
        }
        let segmentation = self.branches.segmentation();

        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let services = service_ids
                .iter()
                .map(|id| {
                    branch
                        .services
                        .get(id)
                        .cloned()
                        .ok_or_else(|| BranchError::not_found(format!("Service {} not found in {}", id, branch_id)))
                })
                .collect::<Result<Vec<Service>>>()?;

            let mut visit = Visit::new(branch_id, services, parameters);
            let queue_id = route(segmentation, &visit, branch)?.id.clone();
            let number = branch.increment_ticket_counter(&queue_id);
            visit.ticket = branch
                .queues
                .get(&queue_id)
                .map(|q| q.ticket_for(number))
                .unwrap_or_default();
            visit.queue_id = Some(queue_id);
            outbox.visit_event(VisitEvent::Created, &visit);

            let visit = branch.update_visit(visit, VisitEvent::PlacedInQueue, Placement::End, outbox)?;
            info!("🎫 Visit {} ticket {} created in {}", visit.id, visit.ticket, branch_id);
            Ok(visit)
        })
    }

    /// Call the next visit chosen by the branch's call rule
    pub fn call_next(&self, branch_id: &str, service_point_id: &str) -> Result<Option<Visit>> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            ensure_free(branch, service_point_id)?;
            let rule = self.rules.for_branch(branch)?;
            match rule.call(branch, service_point_id)? {
                Some(visit) => call_into(branch, service_point_id, visit, outbox).map(Some),
                None => {
                    debug!("Nothing to call for {} in {}", service_point_id, branch_id);
                    Ok(None)
                }
            }
        })
    }

    /// Like [`call_next`](Self::call_next) but only searching `queue_ids`
    pub fn call_next_from_queues(
        &self,
        branch_id: &str,
        service_point_id: &str,
        queue_ids: &[String],
    ) -> Result<Option<Visit>> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            ensure_free(branch, service_point_id)?;
            let rule = self.rules.for_branch(branch)?;
            match rule.call_from_queues(branch, service_point_id, queue_ids)? {
                Some(visit) => call_into(branch, service_point_id, visit, outbox).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Cherry-pick a specific waiting visit
    pub fn call_visit(&self, branch_id: &str, service_point_id: &str, visit_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            branch.work_profile_at(service_point_id)?;
            ensure_free(branch, service_point_id)?;
            let mut visit = find(branch, visit_id)?;
            if matches!(branch.locate(visit_id), Some(PlacementTarget::ServicePoint(_))) {
                return Err(BranchError::conflict(format!("Visit {} is already being served", visit_id)));
            }
            visit.clear_call_hints();
            call_into(branch, service_point_id, visit, outbox)
        })
    }

    pub fn recall(&self, branch_id: &str, service_point_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let mut visit = current(branch, service_point_id)?;
            visit.call_date_time = Some(Utc::now());
            branch.update_visit(visit, VisitEvent::Recalled, Placement::End, outbox)
        })
    }

    pub fn confirm(&self, branch_id: &str, service_point_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let mut visit = current(branch, service_point_id)?;
            visit.start_serving_date_time = Some(Utc::now());
            branch.update_visit(visit, VisitEvent::Confirmed, Placement::End, outbox)
        })
    }

    pub fn no_show(&self, branch_id: &str, service_point_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = current(branch, service_point_id)?;
            let visit = branch.update_visit(visit, VisitEvent::NoShow, Placement::End, outbox)?;
            info!("👻 Visit {} did not show up at {}", visit.id, service_point_id);
            Ok(visit)
        })
    }

    /// Move a visit into a queue; `transfer_time_delay` seconds must pass
    /// before the call rules consider it again
    pub fn transfer_to_queue(
        &self,
        branch_id: &str,
        visit_id: &str,
        queue_id: &str,
        placement: Placement,
        transfer_time_delay: i64,
    ) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let mut visit = find(branch, visit_id)?;
            visit.transfer_time_delay = transfer_time_delay;
            transfer(branch, visit, PlacementTarget::Queue(queue_id.to_string()), placement, outbox)
        })
    }

    pub fn transfer_to_service_point_pool(
        &self,
        branch_id: &str,
        visit_id: &str,
        service_point_id: &str,
        placement: Placement,
    ) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = find(branch, visit_id)?;
            let target = PlacementTarget::ServicePointPool(service_point_id.to_string());
            transfer(branch, visit, target, placement, outbox)
        })
    }

    pub fn transfer_to_user_pool(
        &self,
        branch_id: &str,
        visit_id: &str,
        user_id: &str,
        placement: Placement,
    ) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = find(branch, visit_id)?;
            transfer(branch, visit, PlacementTarget::UserPool(user_id.to_string()), placement, outbox)
        })
    }

    /// Return the visit at `service_point_id` to the queue it was called from
    pub fn back_to_queue(&self, branch_id: &str, service_point_id: &str, return_time_delay: i64) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = current(branch, service_point_id)?;
            let queue_id = visit
                .parameter_map
                .get(LAST_QUEUE_ID)
                .map(String::as_str)
                .or_else(|| visit.current_queue_link())
                .map(str::to_string)
                .ok_or_else(|| BranchError::not_found(format!("No queue to return visit {} to", visit.id)))?;
            give_back(branch, visit, PlacementTarget::Queue(queue_id), return_time_delay, outbox)
        })
    }

    pub fn back_to_service_point_pool(
        &self,
        branch_id: &str,
        service_point_id: &str,
        pool_service_point_id: &str,
        return_time_delay: i64,
    ) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = current(branch, service_point_id)?;
            let target = PlacementTarget::ServicePointPool(pool_service_point_id.to_string());
            give_back(branch, visit, target, return_time_delay, outbox)
        })
    }

    pub fn back_to_user_pool(
        &self,
        branch_id: &str,
        service_point_id: &str,
        user_id: &str,
        return_time_delay: i64,
    ) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let visit = current(branch, service_point_id)?;
            give_back(branch, visit, PlacementTarget::UserPool(user_id.to_string()), return_time_delay, outbox)
        })
    }

    /// Finish the current service of the visit at `service_point_id`
    pub fn end_visit(&self, branch_id: &str, service_point_id: &str) -> Result<Visit> {
        let segmentation = self.branches.segmentation();
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            finish_current_visit(branch, service_point_id, segmentation, outbox)
        })
    }

    /// Add a service to the visit being served at `service_point_id`; it is
    /// served after the ones already pending
    pub fn add_service(&self, branch_id: &str, service_point_id: &str, service_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            branch.annotate_current_visit(
                service_point_id,
                VisitEvent::AddService,
                |branch, visit| {
                    if visit.has_service(service_id) {
                        return Err(BranchError::conflict(format!(
                            "Service {} already added to visit {}",
                            service_id, visit.id
                        )));
                    }
                    let service = branch.services.get(service_id).cloned().ok_or_else(|| {
                        BranchError::not_found(format!("Service {} not found in {}", service_id, branch.id))
                    })?;
                    let mut parameters = staff_parameters(visit);
                    parameters.insert("serviceId".to_string(), service.id.clone());
                    parameters.insert("serviceName".to_string(), service.name.clone());
                    visit.unserved_services.push(service);
                    Ok(parameters)
                },
                outbox,
            )
        })
    }

    /// Attach one of the branch's marks to the visit being served
    pub fn add_mark(&self, branch_id: &str, service_point_id: &str, mark_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            branch.annotate_current_visit(
                service_point_id,
                VisitEvent::AddedMark,
                |branch, visit| {
                    let mut mark = branch_mark(branch, mark_id)?;
                    ensure_serving(visit)?;
                    mark.mark_date = Some(Utc::now());
                    let mut parameters = staff_parameters(visit);
                    parameters.insert("mark".to_string(), mark.value.clone());
                    visit.visit_marks.push(mark);
                    Ok(parameters)
                },
                outbox,
            )
        })
    }

    pub fn delete_mark(&self, branch_id: &str, service_point_id: &str, mark_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            branch.annotate_current_visit(
                service_point_id,
                VisitEvent::DeletedMark,
                |branch, visit| {
                    let mark = branch_mark(branch, mark_id)?;
                    ensure_serving(visit)?;
                    visit.visit_marks.retain(|m| m.id != mark.id);
                    let mut parameters = staff_parameters(visit);
                    parameters.insert("mark".to_string(), mark.value);
                    Ok(parameters)
                },
                outbox,
            )
        })
    }

    /// Take a visit out of the branch wherever it is
    ///
    /// A visit still inside its return cool-down cannot be deleted.
    pub fn delete_visit(&self, branch_id: &str, visit_id: &str) -> Result<Visit> {
        self.branches.with_branch_mut(branch_id, |branch, outbox| {
            let mut visit = find(branch, visit_id)?;
            let returning = visit.returning_time(Utc::now());
            if returning.is_some_and(|secs| secs < visit.return_time_delay) {
                return Err(BranchError::conflict(format!("Visit {} was just returned", visit_id)));
            }
            visit.clear_placement();
            let visit = branch.update_visit(visit, VisitEvent::Deleted, Placement::End, outbox)?;
            info!("🗑️ Visit {} deleted from {}", visit.id, branch_id);
            Ok(visit)
        })
    }

    // ---- queries ---------------------------------------------------------

    pub fn visit(&self, branch_id: &str, visit_id: &str) -> Result<Visit> {
        self.branches.with_branch(branch_id, |branch| find(branch, visit_id))?
    }

    pub fn all_visits(&self, branch_id: &str) -> Result<Vec<Visit>> {
        self.branches
            .with_branch(branch_id, |branch| branch.visits().into_iter().cloned().collect())
    }

    pub fn visits_by_status(&self, branch_id: &str, statuses: &[VisitState]) -> Result<Vec<Visit>> {
        self.branches.with_branch(branch_id, |branch| {
            branch.visits_by_status(statuses).into_iter().cloned().collect()
        })
    }

    /// Visits of one queue, in queue order
    pub fn queue_visits(&self, branch_id: &str, queue_id: &str) -> Result<Vec<Visit>> {
        self.branches.with_branch(branch_id, |branch| {
            branch
                .queues
                .get(queue_id)
                .map(|q| q.visits.clone())
                .ok_or_else(|| BranchError::not_found(format!("Queue {} not found in {}", queue_id, branch_id)))
        })?
    }

    /// Service points whose user could call `visit_id`
    pub fn available_service_points(&self, branch_id: &str, visit_id: &str) -> Result<Vec<ServicePoint>> {
        self.branches.with_branch(branch_id, |branch| {
            let visit = find(branch, visit_id)?;
            let rule = self.rules.for_branch(branch)?;
            Ok(rule.available_service_points(branch, &visit))
        })?
    }

    /// Queues the user at `service_point_id` may call from, sorted by id
    pub fn reachable_queues(&self, branch_id: &str, service_point_id: &str) -> Result<Vec<Queue>> {
        self.branches.with_branch(branch_id, |branch| {
            let profile = branch.work_profile_at(service_point_id)?;
            let mut queues: Vec<Queue> = profile
                .queue_ids
                .iter()
                .filter_map(|id| branch.queues.get(id).cloned())
                .collect();
            queues.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(queues)
        })?
    }
}

/// End the current service of the visit at `service_point_id`
///
/// With unserved services left the next one becomes current and the visit
/// goes `BACK_TO_QUEUE` into the queue segmentation picks for it; otherwise
/// it ends.
pub(crate) fn finish_current_visit(
    branch: &mut Branch,
    service_point_id: &str,
    segmentation: &SegmentationRule,
    outbox: &mut Outbox,
) -> Result<Visit> {
    let mut visit = current(branch, service_point_id)?;
    let now = Utc::now();
    visit.served_date_time = Some(now);
    if let Some(done) = visit.current_service.take() {
        visit.served_services.push(done);
    }

    if visit.unserved_services.is_empty() {
        let visit = branch.update_visit(visit, VisitEvent::End, Placement::End, outbox)?;
        info!("🏁 Visit {} ended at {}", visit.id, service_point_id);
        return Ok(visit);
    }

    visit.current_service = Some(visit.unserved_services.remove(0));
    let queue_id = route(segmentation, &visit, branch)?.id.clone();
    visit.start_serving_date_time = None;
    visit.served_date_time = None;
    visit.place_at(&PlacementTarget::Queue(queue_id));
    let visit = branch.update_visit(visit, VisitEvent::BackToQueue, Placement::End, outbox)?;
    info!("➡️ Visit {} moved on to its next service in {:?}", visit.id, visit.queue_id);
    Ok(visit)
}

fn route<'a>(segmentation: &SegmentationRule, visit: &Visit, branch: &'a Branch) -> Result<&'a Queue> {
    segmentation.get_queue(visit, branch)?.ok_or_else(|| {
        let service = visit.current_service.as_ref().map(|s| s.id.as_str()).unwrap_or("-");
        BranchError::not_found(format!("No queue for service {} in {}", service, branch.id))
    })
}

fn find(branch: &Branch, visit_id: &str) -> Result<Visit> {
    branch
        .find_visit(visit_id)
        .cloned()
        .ok_or_else(|| BranchError::not_found(format!("Visit {} not found in {}", visit_id, branch.id)))
}

fn current(branch: &Branch, service_point_id: &str) -> Result<Visit> {
    let sp = branch.service_points.get(service_point_id).ok_or_else(|| {
        BranchError::not_found(format!("Service point {} not found in {}", service_point_id, branch.id))
    })?;
    sp.current_visit
        .clone()
        .ok_or_else(|| BranchError::not_found(format!("No visit at service point {}", service_point_id)))
}

fn branch_mark(branch: &Branch, mark_id: &str) -> Result<Mark> {
    branch
        .marks
        .get(mark_id)
        .cloned()
        .ok_or_else(|| BranchError::not_found(format!("Mark {} not found!", mark_id)))
}

fn ensure_serving(visit: &Visit) -> Result<()> {
    match visit.current_service {
        Some(_) => Ok(()),
        None => Err(BranchError::not_found(format!("Visit {} has no current service", visit.id))),
    }
}

fn staff_parameters(visit: &Visit) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    if let Some(id) = &visit.user_id {
        parameters.insert("staffId".to_string(), id.clone());
    }
    if let Some(name) = &visit.user_name {
        parameters.insert("staffName".to_string(), name.clone());
    }
    parameters
}

fn ensure_free(branch: &Branch, service_point_id: &str) -> Result<()> {
    let sp = branch.service_points.get(service_point_id).ok_or_else(|| {
        BranchError::not_found(format!("Service point {} not found in {}", service_point_id, branch.id))
    })?;
    match &sp.current_visit {
        Some(busy) => Err(BranchError::conflict(format!(
            "Service point {} is already serving visit {}",
            service_point_id, busy.id
        ))),
        None => Ok(()),
    }
}

/// Put a selected visit into the service point's slot
fn call_into(branch: &mut Branch, service_point_id: &str, mut visit: Visit, outbox: &mut Outbox) -> Result<Visit> {
    let now = Utc::now();
    if let Some(queue_id) = visit.queue_id.clone() {
        visit.parameter_map.insert(LAST_QUEUE_ID.to_string(), queue_id);
    }
    if let Some(user) = branch.service_point_user(service_point_id) {
        visit.user_id = Some(user.id.clone());
        visit.user_name = Some(user.name.clone());
    }
    let confirm_required = branch
        .service_points
        .get(service_point_id)
        .is_some_and(|sp| sp.confirm_required);

    visit.call_date_time = Some(now);
    visit.service_point_id = Some(service_point_id.to_string());
    let mut visit = branch.update_visit(visit, VisitEvent::Called, Placement::End, outbox)?;
    info!("📣 Visit {} called to {}", visit.ticket, service_point_id);

    if !confirm_required {
        visit.start_serving_date_time = Some(now);
        visit = branch.update_visit(visit, VisitEvent::Confirmed, Placement::End, outbox)?;
    }
    Ok(visit)
}

fn transfer(
    branch: &mut Branch,
    mut visit: Visit,
    target: PlacementTarget,
    placement: Placement,
    outbox: &mut Outbox,
) -> Result<Visit> {
    let now = Utc::now();
    visit.transfer_date_time = Some(now);
    if placement == Placement::Start {
        visit.mark_transferred_to_start(now);
    }
    let event = match target {
        PlacementTarget::Queue(_) => VisitEvent::TransferToQueue,
        PlacementTarget::ServicePointPool(_) => VisitEvent::TransferToServicePointPool,
        PlacementTarget::UserPool(_) => VisitEvent::TransferToUserPool,
        PlacementTarget::ServicePoint(_) => {
            return Err(BranchError::invalid_input("Use a call to move a visit into a service point"));
        }
    };
    visit.place_at(&target);
    branch.update_visit(visit, event, placement, outbox)
}

fn give_back(
    branch: &mut Branch,
    mut visit: Visit,
    target: PlacementTarget,
    return_time_delay: i64,
    outbox: &mut Outbox,
) -> Result<Visit> {
    visit.return_date_time = Some(Utc::now());
    visit.return_time_delay = return_time_delay;
    let event = match target {
        PlacementTarget::Queue(_) => VisitEvent::BackToQueue,
        PlacementTarget::ServicePointPool(_) => VisitEvent::BackToServicePointPool,
        PlacementTarget::UserPool(_) => VisitEvent::BackToUserPool,
        PlacementTarget::ServicePoint(_) => {
            return Err(BranchError::invalid_input("A visit cannot be given back to a service point slot"));
        }
    };
    visit.place_at(&target);
    branch.update_visit(visit, event, Placement::End, outbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BranchEngineConfig;
    use crate::events::{EventBus, BROADCAST};
    use crate::identity::NoIdentityProvider;
    use crate::model::{User, WorkProfile};
    use crate::rules::CallRuleKind;

    fn services() -> (VisitService, Arc<EventBus>) {
        let config = Arc::new(BranchEngineConfig::default());
        let bus = Arc::new(EventBus::from_config(&config));
        let store = Arc::new(BranchService::new(config, bus.clone(), Arc::new(NoIdentityProvider)));
        let branch = Branch::new("b1", "Main")
            .with_queue(Queue::new("q1", "Cash", "A"))
            .with_queue(Queue::new("q2", "Loans", "B"))
            .with_service(Service::new("s1", "Cash", "q1"))
            .with_service(Service::new("s2", "Loans", "q2"))
            .with_service_point(ServicePoint::new("sp1", "Window 1"))
            .with_service_point(ServicePoint::new("sp2", "Window 2").with_confirm_required())
            .with_work_profile(WorkProfile::new("wp1", "Teller").with_queue("q1").with_queue("q2"))
            .with_user_at(User::new("u1", "alice").with_work_profile("wp1"), "sp1")
            .with_user_at(User::new("u2", "bob").with_work_profile("wp1"), "sp2");
        store.add(branch).unwrap();
        let rules = Arc::new(CallRules::new(CallRuleKind::MaxWaitingTime));
        (VisitService::new(store, rules), bus)
    }

    #[test]
    fn test_create_numbers_tickets_per_queue() {
        let (svc, bus) = services();
        let v1 = svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        let v2 = svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        let v3 = svc.create_visit("b1", &["s2".into()], HashMap::new()).unwrap();

        assert_eq!((v1.ticket.as_str(), v2.ticket.as_str(), v3.ticket.as_str()), ("A001", "A002", "B001"));
        assert_eq!(v1.status, VisitState::PlacedInQueue);
        let types: Vec<String> = bus.history_for(BROADCAST).iter().map(|p| p.notification.event_type.clone()).collect();
        assert_eq!(&types[..2], &["VISIT_CREATED", "VISIT_PLACED_IN_QUEUE"]);

        let err = svc.create_visit("b1", &["nope".into()], HashMap::new()).unwrap_err();
        assert!(matches!(err, BranchError::NotFound(_)));
    }

    #[test]
    fn test_call_auto_confirms_unless_required() {
        let (svc, _) = services();
        let v1 = svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        let v2 = svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();

        let called = svc.call_next("b1", "sp1").unwrap().unwrap();
        assert_eq!(called.id, v1.id);
        assert_eq!(called.status, VisitState::Confirmed);
        assert_eq!(called.user_name.as_deref(), Some("alice"));
        assert_eq!(called.parameter_map.get(LAST_QUEUE_ID).map(String::as_str), Some("q1"));

        let waiting = svc.call_next("b1", "sp2").unwrap().unwrap();
        assert_eq!(waiting.id, v2.id);
        assert_eq!(waiting.status, VisitState::Called);
        assert_eq!(svc.confirm("b1", "sp2").unwrap().status, VisitState::Confirmed);

        assert!(matches!(svc.call_next("b1", "sp1"), Err(BranchError::Conflict(_))));
    }

    #[test]
    fn test_multi_service_visit_moves_on_then_ends() {
        let (svc, _) = services();
        let v = svc.create_visit("b1", &["s1".into(), "s2".into()], HashMap::new()).unwrap();
        svc.call_next("b1", "sp1").unwrap();

        let moved = svc.end_visit("b1", "sp1").unwrap();
        assert_eq!(moved.status, VisitState::BackToQueue);
        assert_eq!(moved.queue_id.as_deref(), Some("q2"));
        assert_eq!(moved.served_services.len(), 1);
        assert_eq!(svc.queue_visits("b1", "q2").unwrap()[0].id, v.id);

        svc.call_visit("b1", "sp1", &v.id).unwrap();
        let ended = svc.end_visit("b1", "sp1").unwrap();
        assert_eq!(ended.status, VisitState::End);
        assert!(svc.all_visits("b1").unwrap().is_empty());
    }

    #[test]
    fn test_back_to_queue_waits_for_cooldown() {
        let (svc, _) = services();
        svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        svc.call_next("b1", "sp1").unwrap();

        let returned = svc.back_to_queue("b1", "sp1", 300).unwrap();
        assert_eq!(returned.queue_id.as_deref(), Some("q1"));
        assert!(svc.call_next("b1", "sp1").unwrap().is_none());
    }

    #[test]
    fn test_transfer_to_start_sets_marker() {
        let (svc, _) = services();
        let first = svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        let second = svc.create_visit("b1", &["s2".into()], HashMap::new()).unwrap();

        let moved = svc
            .transfer_to_queue("b1", &second.id, "q1", Placement::Start, 0)
            .unwrap();
        assert!(moved.is_transferred_to_start());
        let order: Vec<String> = svc.queue_visits("b1", "q1").unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(order, vec![second.id.clone(), first.id]);
        assert!(svc.queue_visits("b1", "q2").unwrap().is_empty());
    }

    #[test]
    fn test_no_show_only_after_call() {
        let (svc, _) = services();
        svc.create_visit("b1", &["s1".into()], HashMap::new()).unwrap();
        svc.call_next("b1", "sp2").unwrap();
        let gone = svc.no_show("b1", "sp2").unwrap();
        assert_eq!(gone.status, VisitState::NoShow);
        assert!(matches!(svc.no_show("b1", "sp2"), Err(BranchError::NotFound(_))));
    }

    #[test]
    fn test_reachable_queues_forbidden_without_user() {
        let (svc, _) = services();
        let queues = svc.reachable_queues("b1", "sp1").unwrap();
        assert_eq!(queues.iter().map(|q| q.id.as_str()).collect::<Vec<_>>(), vec!["q1", "q2"]);

        svc.branches()
            .close_service_point("b1", "sp1", &Default::default())
            .unwrap();
        assert!(matches!(svc.reachable_queues("b1", "sp1"), Err(BranchError::Forbidden(_))));
    }
}
