//! Visit lifecycle scenarios across the store, the call rules and the
//! branch aggregate

mod common;

use std::time::Duration;

use common::*;
use qflow_branch_engine::events::{Outbox, BROADCAST, FRONTEND, STAT};
use qflow_branch_engine::prelude::*;

#[test]
fn test_ticket_then_call_moves_visit_into_slot() {
    let engine = engine();
    let v1 = create(&engine, "s1");
    assert_eq!(v1.ticket, "A001");
    assert_eq!(v1.queue_id.as_deref(), Some("q1"));

    let mut branch = engine.branches().get_branch(BRANCH).unwrap();
    let picked = MaxWaitingTimeCallRule.call(&mut branch, "sp1").unwrap().unwrap();
    assert_eq!(picked.id, v1.id);

    let mut outbox = Outbox::new();
    let mut picked = picked;
    picked.service_point_id = Some("sp1".to_string());
    let called = branch
        .update_visit(picked, VisitEvent::Called, Placement::End, &mut outbox)
        .unwrap();

    assert_eq!(called.status, VisitState::Called);
    assert!(!branch.queues["q1"].contains(&v1.id));
    assert_eq!(
        branch.service_points["sp1"].current_visit.as_ref().map(|v| v.id.clone()),
        Some(v1.id.clone())
    );
    let channels: Vec<&str> = outbox.iter().map(|p| p.channel).collect();
    assert_eq!(channels, vec![BROADCAST, STAT, FRONTEND]);
}

#[test]
fn test_transfer_to_user_pool_at_start() {
    let engine = engine();
    let waiting = create(&engine, "s1");
    let v1 = create(&engine, "s1");
    engine
        .visits()
        .transfer_to_user_pool(BRANCH, &waiting.id, "u2", Placement::End)
        .unwrap();

    let moved = engine
        .visits()
        .transfer_to_user_pool(BRANCH, &v1.id, "u2", Placement::Start)
        .unwrap();
    assert_eq!(moved.status, VisitState::TransferToUserPool);
    assert_eq!(moved.pool_user_id.as_deref(), Some("u2"));
    assert!(moved.queue_id.is_none());

    let branch = engine.branches().get_branch(BRANCH).unwrap();
    let pool: Vec<&str> = branch.users["u2"].pool.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(pool, vec![v1.id.as_str(), waiting.id.as_str()]);
    assert!(branch.queues["q1"].visits.is_empty());
    assert_eq!(holders(&branch, &v1.id), 1);
}

#[test]
fn test_occupied_slot_is_never_overwritten() {
    let engine = engine();
    let first = create(&engine, "s1");
    let second = create(&engine, "s1");
    engine.visits().call_next(BRANCH, "sp1").unwrap();
    let before = engine.branches().get_branch(BRANCH).unwrap();

    let err = engine.visits().call_visit(BRANCH, "sp1", &second.id).unwrap_err();
    assert!(matches!(err, BranchError::Conflict(_)));

    let mut direct = engine.visits().visit(BRANCH, &second.id).unwrap();
    direct.service_point_id = Some("sp1".to_string());
    let err = engine
        .branches()
        .update_visit(direct, VisitEvent::Called, Placement::End)
        .unwrap_err();
    assert!(matches!(err, BranchError::Conflict(_)));

    let after = engine.branches().get_branch(BRANCH).unwrap();
    assert_eq!(after, before);
    assert_eq!(
        after.service_points["sp1"].current_visit.as_ref().map(|v| v.id.clone()),
        Some(first.id)
    );

    let bus = bus(&engine);
    assert!(bus.event_types().iter().any(|t| t == "BUSINESS_ERROR"));
}

#[test]
fn test_confirmation_flow_with_recall() {
    let engine = engine();
    let v = create(&engine, "s2");

    let called = engine.visits().call_next(BRANCH, "sp2").unwrap().unwrap();
    assert_eq!(called.id, v.id);
    assert_eq!(called.status, VisitState::Called);
    assert_eq!(called.user_name.as_deref(), Some("bob"));

    let recalled = engine.visits().recall(BRANCH, "sp2").unwrap();
    assert_eq!(recalled.status, VisitState::Called);
    assert_eq!(recalled.last_event(), Some(VisitEvent::Recalled));

    let confirmed = engine.visits().confirm(BRANCH, "sp2").unwrap();
    assert!(confirmed.start_serving_date_time.is_some());

    // Serving cannot be confirmed twice
    assert!(matches!(engine.visits().confirm(BRANCH, "sp2"), Err(BranchError::Conflict(_))));
}

#[test]
fn test_back_to_pools_and_end() {
    let engine = engine();
    let v = create(&engine, "s1");
    engine.visits().call_next(BRANCH, "sp1").unwrap();

    let parked = engine.visits().back_to_service_point_pool(BRANCH, "sp1", "sp2", 0).unwrap();
    assert_eq!(parked.status, VisitState::BackToServicePointPool);
    assert!(parked.return_date_time.is_some());

    let branch = engine.branches().get_branch(BRANCH).unwrap();
    assert!(branch.service_points["sp1"].current_visit.is_none());
    assert_eq!(branch.service_points["sp2"].pool.len(), 1);

    engine.visits().call_visit(BRANCH, "sp1", &v.id).unwrap();
    engine.visits().back_to_user_pool(BRANCH, "sp1", "u1", 0).unwrap();
    engine.visits().call_visit(BRANCH, "sp1", &v.id).unwrap();

    let ended = engine.visits().end_visit(BRANCH, "sp1").unwrap();
    assert_eq!(ended.status, VisitState::End);
    assert!(ended.end_date_time.is_some());
    assert!(engine.visits().visit(BRANCH, &v.id).is_err());
    assert!(engine.visits().visits_by_status(BRANCH, &[VisitState::End]).unwrap().is_empty());
}

#[test]
fn test_index_placement_inside_queue() {
    let engine = engine();
    let a = create(&engine, "s1");
    let b = create(&engine, "s1");
    let c = create(&engine, "s2");

    engine
        .visits()
        .transfer_to_queue(BRANCH, &c.id, "q1", Placement::Index(1), 0)
        .unwrap();
    assert_eq!(queue_order(&engine, "q1"), vec![a.id.clone(), c.id.clone(), b.id.clone()]);

    let err = engine
        .visits()
        .transfer_to_queue(BRANCH, &a.id, "q2", Placement::Index(5), 0)
        .unwrap_err();
    assert!(matches!(err, BranchError::Conflict(_)));
    assert_eq!(queue_order(&engine, "q1"), vec![a.id.clone(), c.id, b.id]);

    // The rejection is kept in the notification history, not on the visit
    let stored = engine.visits().visit(BRANCH, &a.id).unwrap();
    assert_eq!(stored.visit_events, a.visit_events);
    assert_eq!(bus(&engine).event_types().last().map(String::as_str), Some("BUSINESS_ERROR"));
}

#[test]
fn test_property_segmentation_on_create() {
    let engine = engine();
    let mut segmented = branch(BRANCH)
        .with_queue(Queue::new("q-vip", "VIP", "V"))
        .with_service_group(ServiceGroup::new("g1", "Money", vec!["s1".to_string()]))
        .with_segmentation_rule(SegmentationRuleData::new("r1", "g1", "q-vip").with_property("vip", "true"));
    segmented.name = "Segmented".to_string();
    engine.branches().add(segmented).unwrap();

    let vip = engine
        .visits()
        .create_visit(BRANCH, &["s1".to_string()], params(&[("vip", "true")]))
        .unwrap();
    assert_eq!(vip.queue_id.as_deref(), Some("q-vip"));
    assert_eq!(vip.ticket, "V001");

    let plain = engine
        .visits()
        .create_visit(BRANCH, &["s1".to_string()], params(&[("vip", "no")]))
        .unwrap();
    assert_eq!(plain.queue_id.as_deref(), Some("q1"));
}

#[tokio::test]
async fn test_subscribers_see_visit_notifications() {
    let engine = engine();
    let mut rx = bus(&engine).subscribe();

    let v = create(&engine, "s1");

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification in time")
        .expect("open channel");
    assert_eq!(first.notification.event_type, "VISIT_CREATED");
    assert_eq!(first.notification.params.get("visitId"), Some(&v.id));
    assert_eq!(first.notification.sender_service, engine.config().general.application_name);
}

#[test]
fn test_marks_and_extra_services_annotate_in_place() {
    let engine = engine();
    let v = create(&engine, "s1");
    engine.visits().call_next(BRANCH, "sp1").unwrap();

    let marked = engine.visits().add_mark(BRANCH, "sp1", "m1").unwrap();
    assert_eq!(marked.visit_marks.len(), 1);
    assert!(marked.visit_marks[0].mark_date.is_some());
    assert_eq!(marked.status, VisitState::Confirmed);
    assert_eq!(marked.last_event(), Some(VisitEvent::AddedMark));

    let err = engine.visits().add_mark(BRANCH, "sp1", "m-unknown").unwrap_err();
    assert!(matches!(err, BranchError::NotFound(_)));

    let extended = engine.visits().add_service(BRANCH, "sp1", "s2").unwrap();
    assert_eq!(extended.unserved_services.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["s2"]);
    let err = engine.visits().add_service(BRANCH, "sp1", "s1").unwrap_err();
    assert!(matches!(err, BranchError::Conflict(_)));

    let unmarked = engine.visits().delete_mark(BRANCH, "sp1", "m1").unwrap();
    assert!(unmarked.visit_marks.is_empty());

    // The slot still holds the visit and later moves ignore the annotations
    let branch = engine.branches().get_branch(BRANCH).unwrap();
    assert_eq!(holders(&branch, &v.id), 1);
    assert_eq!(branch.service_points["sp1"].current_visit.as_ref(), Some(&unmarked));

    let moved = engine.visits().end_visit(BRANCH, "sp1").unwrap();
    assert_eq!(moved.status, VisitState::BackToQueue);
    assert_eq!(moved.queue_id.as_deref(), Some("q2"));

    let bus = bus(&engine);
    let types = bus.event_types();
    assert!(types.iter().any(|t| t == "VISIT_ADDED_MARK"));
    assert!(types.iter().any(|t| t == "VISIT_ADD_SERVICE"));
    assert!(types.iter().any(|t| t == "VISIT_DELETED_MARK"));
}

#[test]
fn test_annotations_need_a_visit_in_the_slot() {
    let engine = engine();
    create(&engine, "s1");
    let before = engine.branches().get_branch(BRANCH).unwrap();

    let err = engine.visits().add_mark(BRANCH, "sp1", "m1").unwrap_err();
    assert!(matches!(err, BranchError::NotFound(_)));
    assert_eq!(engine.branches().get_branch(BRANCH).unwrap(), before);
}

#[test]
fn test_delete_visit_respects_return_cooldown() {
    let engine = engine();
    let waiting = create(&engine, "s1");
    let deleted = engine.visits().delete_visit(BRANCH, &waiting.id).unwrap();
    assert_eq!(deleted.status, VisitState::Deleted);
    assert!(deleted.end_date_time.is_some());
    assert!(engine.visits().visit(BRANCH, &waiting.id).is_err());

    let returned = create(&engine, "s1");
    engine.visits().call_next(BRANCH, "sp1").unwrap();
    engine.visits().back_to_queue(BRANCH, "sp1", 300).unwrap();
    let err = engine.visits().delete_visit(BRANCH, &returned.id).unwrap_err();
    assert!(matches!(err, BranchError::Conflict(_)));
    assert_eq!(queue_order(&engine, "q1"), vec![returned.id.clone()]);

    let bus = bus(&engine);
    assert!(bus.event_types().iter().any(|t| t == "VISIT_DELETED"));
}
