//! Configuration publishing, branch deletion and the identity boundary

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use parking_lot::Mutex;
use qflow_branch_engine::events::{EventBus, CONFIG};
use qflow_branch_engine::prelude::*;

use common::*;

fn set(branches: Vec<Branch>) -> HashMap<String, Branch> {
    branches.into_iter().map(|b| (b.id.clone(), b)).collect()
}

/// A branch that fails validation when published
fn broken(id: &str) -> Branch {
    Branch::new(id, "Broken").with_service(Service::new("s-x", "Orphan", "no-such-queue"))
}

#[test]
fn test_failed_publish_keeps_previous_set_exactly() {
    let engine = engine();
    let visit = create(&engine, "s1");
    let before = engine.branches().detailed_branches();
    let bus = bus(&engine);
    bus.clear_history();

    let mut changed = branch(BRANCH);
    changed.name = "Renamed".to_string();
    let err = engine
        .configuration()
        .publish(set(vec![changed, broken("b2")]))
        .unwrap_err();

    assert!(matches!(err, BranchError::NotFound(_)));
    assert_eq!(engine.branches().detailed_branches(), before);
    assert!(!engine.branches().branch_exists("b2"));
    assert_eq!(engine.visits().visit(BRANCH, &visit.id).unwrap().id, visit.id);

    let types = bus.event_types();
    let failed = types.iter().position(|t| t == "PUBLIC_FAILED").expect("failure notification");
    let started = types.iter().position(|t| t == "ROLLBACK_STARTED").expect("rollback start");
    let complete = types.iter().position(|t| t == "ROLLBACK_COMPLETE").expect("rollback complete");
    assert!(failed < started && started < complete);
    assert!(types.iter().any(|t| t == "BUSINESS_ERROR"));
    assert!(!types.iter().any(|t| t == "PUBLIC_COMPLETE"));
    assert!(bus.history_for(CONFIG).is_empty(), "audit of the discarded batch leaked");
}

#[test]
fn test_readers_never_see_a_publish_that_is_rolled_back() {
    let engine = engine();
    let done = AtomicBool::new(false);

    let leaks = thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut leaks = 0usize;
            while !done.load(Ordering::Acquire) {
                if engine.branches().branches().iter().any(|b| b.name == "Renamed") {
                    leaks += 1;
                }
                if engine.branches().branch_exists("b2") {
                    leaks += 1;
                }
            }
            leaks
        });

        for _ in 0..200 {
            let mut changed = branch(BRANCH);
            changed.name = "Renamed".to_string();
            let err = engine
                .configuration()
                .publish(set(vec![changed, broken("b2")]))
                .unwrap_err();
            assert!(matches!(err, BranchError::NotFound(_)));
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap()
    });

    assert_eq!(leaks, 0, "a reader observed a half-applied publish");
    assert_eq!(engine.branches().branches()[0].name, format!("Branch {}", BRANCH));
}

#[test]
fn test_publish_deletes_missing_branches_and_closes_their_points() {
    let engine = engine();
    let bus = bus(&engine);

    let held = engine
        .configuration()
        .publish(set(vec![branch("b2")]))
        .unwrap();
    assert_eq!(held.keys().cloned().collect::<Vec<_>>(), vec!["b2".to_string()]);
    assert!(!engine.branches().branch_exists(BRANCH));

    let types = bus.event_types();
    assert_eq!(types.iter().filter(|t| *t == "SERVICE_POINT_CLOSED").count(), 2 * 3);
    assert_eq!(types.first().map(String::as_str), Some("PUBLIC_STARTED"));
    assert_eq!(types.last().map(String::as_str), Some("PUBLIC_COMPLETE"));

    let actions: Vec<String> = bus
        .history_for(CONFIG)
        .iter()
        .map(|p| p.notification.body["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["BRANCH_DELETED", "BRANCH_CREATED"]);
}

#[test]
fn test_publish_is_idempotent_for_same_set() {
    let engine = engine();
    let first = engine.configuration().publish(set(vec![branch(BRANCH)])).unwrap();
    let second = engine.configuration().publish(set(vec![branch(BRANCH)])).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.branches().branches().len(), 1);
}

#[test]
fn test_mismatched_key_is_configuration_error() {
    let engine = engine();
    let mut batch = HashMap::new();
    batch.insert("elsewhere".to_string(), branch("b9"));
    let err = engine.configuration().publish(batch).unwrap_err();
    assert!(matches!(err, BranchError::Configuration(_)));
    assert!(engine.branches().branch_exists(BRANCH));
}

/// Identity provider that records forced logouts
#[derive(Default)]
struct Directory {
    logouts: Mutex<Vec<(String, String)>>,
    fail_logout: bool,
}

impl IdentityProvider for Directory {
    fn user_info(&self, user_name: &str) -> Option<UserInfo> {
        (user_name == "carol").then(|| UserInfo {
            id: "u-carol".to_string(),
            name: "carol".to_string(),
            first_name: Some("Carol".to_string()),
            last_name: None,
            email: Some("carol@example.com".to_string()),
        })
    }

    fn branches_of_user(&self, user_name: &str) -> Vec<UserGroup> {
        match user_name {
            "carol" => vec![UserGroup {
                id: "g1".to_string(),
                name: format!("BR-{}", BRANCH),
            }],
            _ => Vec::new(),
        }
    }

    fn is_user_in_role(&self, user_name: &str, role: &str) -> bool {
        user_name == "carol" && role == "staff"
    }

    fn force_logout(&self, user_id: &str, _forced: bool, reason: &str) -> anyhow::Result<()> {
        if self.fail_logout {
            return Err(anyhow!("identity provider unreachable"));
        }
        self.logouts.lock().push((user_id.to_string(), reason.to_string()));
        Ok(())
    }
}

fn engine_with_directory(directory: Arc<Directory>) -> BranchEngine {
    let mut config = BranchEngineConfig::default();
    config.service_points.required_role = Some("staff".to_string());
    let engine = BranchEngine::with_collaborators(
        config,
        Arc::new(EventBus::new("directory", 64, 256)),
        directory,
        None,
    )
    .unwrap();
    engine.branches().add(branch(BRANCH)).unwrap();
    engine
        .branches()
        .close_service_point(BRANCH, "sp1", &CloseOptions::default())
        .unwrap();
    engine
}

#[test]
fn test_open_uses_identity_and_close_logs_out() {
    let directory = Arc::new(Directory::default());
    let engine = engine_with_directory(directory.clone());

    let carol = engine.branches().open_service_point(BRANCH, "carol", "sp1", "wp1").unwrap();
    assert_eq!(carol.id, "u-carol");
    assert_eq!(carol.email.as_deref(), Some("carol@example.com"));

    let err = engine
        .branches()
        .open_service_point(BRANCH, "mallory", "sp1", "wp1")
        .unwrap_err();
    assert!(matches!(err, BranchError::Forbidden(_)));

    let options = CloseOptions {
        logout: true,
        ..Default::default()
    };
    engine.branches().close_service_point(BRANCH, "sp1", &options).unwrap();
    let logouts = directory.logouts.lock().clone();
    assert_eq!(logouts, vec![("u-carol".to_string(), "Service point closed".to_string())]);

    let mine = engine.branches().user_branches("carol");
    assert_eq!(mine.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec![BRANCH]);
    assert!(engine.branches().user_branches("mallory").is_empty());
}

#[test]
fn test_failed_logout_does_not_fail_close() {
    let directory = Arc::new(Directory {
        fail_logout: true,
        ..Default::default()
    });
    let engine = engine_with_directory(directory);
    engine.branches().open_service_point(BRANCH, "carol", "sp1", "wp1").unwrap();

    let options = CloseOptions {
        logout: true,
        break_reason: Some("lunch".to_string()),
        ..Default::default()
    };
    let user = engine.branches().close_service_point(BRANCH, "sp1", &options).unwrap();
    assert!(user.on_break());
    assert!(user.service_point_id.is_none());
}

#[test]
fn test_close_with_end_visit_finishes_current_service() {
    let engine = engine();
    let v = engine
        .visits()
        .create_visit(BRANCH, &["s1".to_string(), "s2".to_string()], HashMap::new())
        .unwrap();
    engine.visits().call_next(BRANCH, "sp1").unwrap();

    let options = CloseOptions {
        end_visit: true,
        ..Default::default()
    };
    engine.branches().close_service_point(BRANCH, "sp1", &options).unwrap();

    let moved = engine.visits().visit(BRANCH, &v.id).unwrap();
    assert_eq!(moved.status, VisitState::BackToQueue);
    assert_eq!(moved.queue_id.as_deref(), Some("q2"));
    assert!(moved.unserved_services.is_empty());
}

#[test]
fn test_live_config_edits_are_audited_and_all_or_nothing() {
    let engine = engine();
    let bus = bus(&engine);

    engine
        .branches()
        .with_branch_mut(BRANCH, |b, outbox| {
            let queues = HashMap::from([("q3".to_string(), Queue::new("q3", "Cards", "C"))]);
            b.add_update_queues(queues, true, outbox);
            let profiles = HashMap::from([(
                "wp-cards".to_string(),
                WorkProfile::new("wp-cards", "Cards").with_queue("q3"),
            )]);
            b.add_update_work_profiles(profiles, outbox)
        })
        .unwrap();

    let actions: Vec<String> = bus
        .history_for(CONFIG)
        .iter()
        .map(|p| p.notification.body["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["Add queue", "Add or update work profile"]);
    bus.clear_history();

    let before = engine.branches().get_branch(BRANCH).unwrap();
    let err = engine
        .branches()
        .with_branch_mut(BRANCH, |b, outbox| {
            let groups = HashMap::from([(
                "g9".to_string(),
                ServiceGroup::new("g9", "Ghosts", vec!["s1".to_string(), "s-missing".to_string()]),
            )]);
            b.add_update_service_groups(groups, outbox)
        })
        .unwrap_err();

    assert!(matches!(err, BranchError::NotFound(_)));
    assert_eq!(engine.branches().get_branch(BRANCH).unwrap(), before);
    assert!(bus.history_for(CONFIG).is_empty());
    assert_eq!(bus.event_types(), vec!["BUSINESS_ERROR".to_string()]);
}
