//! Shared fixtures for the branch-engine integration tests
//!
//! One branch `b1` with two queues, two services, two service points, two
//! staff members whose work profile reaches both queues, and one mark.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use qflow_branch_engine::prelude::*;

pub const BRANCH: &str = "b1";

pub fn branch(id: &str) -> Branch {
    Branch::new(id, format!("Branch {}", id))
        .with_prefix(format!("BR-{}", id))
        .with_queue(Queue::new("q1", "Cash desk", "A"))
        .with_queue(Queue::new("q2", "Loans", "B"))
        .with_service(Service::new("s1", "Cash", "q1"))
        .with_service(Service::new("s2", "Loans", "q2"))
        .with_service_point(ServicePoint::new("sp1", "Window 1"))
        .with_service_point(ServicePoint::new("sp2", "Window 2").with_confirm_required())
        .with_work_profile(WorkProfile::new("wp1", "Teller").with_queue("q1").with_queue("q2"))
        .with_work_profile(WorkProfile::new("wp-loans", "Loans only").with_queue("q2"))
        .with_user_at(User::new("u1", "alice").with_work_profile("wp1"), "sp1")
        .with_user_at(User::new("u2", "bob").with_work_profile("wp1"), "sp2")
        .with_mark(Mark::new("Needs interpreter").with_id("m1"))
}

/// Engine with the default config and branch `b1` loaded
pub fn engine() -> BranchEngine {
    engine_with(BranchEngineConfig::default())
}

pub fn engine_with(config: BranchEngineConfig) -> BranchEngine {
    let engine = BranchEngine::new(config).expect("engine");
    engine.branches().add(branch(BRANCH)).expect("add branch");
    if let Some(bus) = engine.event_bus() {
        bus.clear_history();
    }
    engine
}

pub fn bus(engine: &BranchEngine) -> Arc<EventBus> {
    engine.event_bus().cloned().expect("built-in bus")
}

pub fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn create(engine: &BranchEngine, service: &str) -> Visit {
    engine
        .visits()
        .create_visit(BRANCH, &[service.to_string()], HashMap::new())
        .expect("create visit")
}

/// Ids of the visits in a queue, front first
pub fn queue_order(engine: &BranchEngine, queue_id: &str) -> Vec<String> {
    engine
        .visits()
        .queue_visits(BRANCH, queue_id)
        .expect("queue")
        .into_iter()
        .map(|v| v.id)
        .collect()
}

/// Every container of the branch holding `visit_id`
pub fn holders(branch: &Branch, visit_id: &str) -> usize {
    let in_queues = branch.queues.values().filter(|q| q.contains(visit_id)).count();
    let in_slots = branch
        .service_points
        .values()
        .filter(|sp| sp.current_visit.as_ref().is_some_and(|v| v.id == visit_id))
        .count();
    let in_sp_pools = branch
        .service_points
        .values()
        .filter(|sp| sp.pool.iter().any(|v| v.id == visit_id))
        .count();
    let in_user_pools = branch
        .users
        .values()
        .filter(|u| u.pool.iter().any(|v| v.id == visit_id))
        .count();
    in_queues + in_slots + in_sp_pools + in_user_pools
}
