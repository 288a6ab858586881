//! Wholesale branch-set publishing with snapshot rollback.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use super::branch_service::BranchService;
use crate::error::{BranchError, Result};
use crate::events::Outbox;
use crate::model::Branch;

/// Replaces the branch set in one step
///
/// The publish holds the set-wide lock for its whole duration. Branches
/// missing from the new set are deleted, the others added or replaced in id
/// order. If any of them fails, every branch is put back exactly as it was
/// before the call and only the failure and rollback notifications go out.
pub struct ConfigurationPublisher {
    branches: Arc<BranchService>,
}

impl ConfigurationPublisher {
    pub fn new(branches: Arc<BranchService>) -> Self {
        Self { branches }
    }

    /// Publish `new_branches`; returns the branch set now held
    pub fn publish(&self, new_branches: HashMap<String, Branch>) -> Result<HashMap<String, Branch>> {
        let mut outbox = Outbox::new();
        let result = {
            let _set = self.branches.lock_set();
            let before = self.branches.snapshot_all();

            let mut applied = Outbox::new();
            match self.apply(&before, new_branches, &mut applied) {
                Ok(ids) => {
                    outbox.broadcast_stat_frontend("PUBLIC_STARTED", json!({ "branchIds": ids }));
                    outbox.append(applied);
                    for id in &ids {
                        outbox.broadcast_stat_frontend("BRANCH_PUBLIC_COMPLETE", json!({ "branchId": id }));
                    }
                    outbox.broadcast_stat_frontend("PUBLIC_COMPLETE", json!({ "branchIds": ids }));
                    info!("📦 Published {} branches", ids.len());
                    Ok(self.branches.snapshot_all())
                }
                Err(err) => {
                    error!("💥 Publishing failed, rolling back: {}", err);
                    outbox.broadcast_stat_frontend(
                        "PUBLIC_FAILED",
                        json!({ "kind": format!("{:?}", err.kind()), "message": err.message() }),
                    );
                    outbox.append(Outbox::rejected(&err));

                    outbox.broadcast_stat_frontend("ROLLBACK_STARTED", json!({ "branchIds": sorted_ids(&before) }));
                    let restored = sorted_ids(&before);
                    self.branches.restore(before);
                    outbox.broadcast_stat_frontend("ROLLBACK_COMPLETE", json!({ "branchIds": restored }));
                    warn!("↩️ Restored {} branches after failed publish", restored.len());
                    Err(err)
                }
            }
        };
        self.branches.dispatch(outbox);
        result
    }

    /// Apply deletions then additions; returns the published ids
    fn apply(
        &self,
        before: &HashMap<String, Branch>,
        new_branches: HashMap<String, Branch>,
        applied: &mut Outbox,
    ) -> Result<Vec<String>> {
        let mut removed: Vec<&String> = before.keys().filter(|id| !new_branches.contains_key(*id)).collect();
        removed.sort();
        for id in removed {
            self.branches.delete_unlocked(id, applied)?;
        }

        let mut incoming: Vec<(String, Branch)> = new_branches.into_iter().collect();
        incoming.sort_by(|a, b| a.0.cmp(&b.0));

        let mut ids = Vec::with_capacity(incoming.len());
        for (key, branch) in incoming {
            if key != branch.id {
                return Err(BranchError::configuration(format!(
                    "Branch published under key {} has id {}",
                    key, branch.id
                )));
            }
            self.branches.add_unlocked(branch, applied)?;
            ids.push(key);
        }
        Ok(ids)
    }
}

fn sorted_ids(branches: &HashMap<String, Branch>) -> Vec<String> {
    let mut ids: Vec<String> = branches.keys().cloned().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BranchEngineConfig;
    use crate::events::{EventBus, BROADCAST, CONFIG};
    use crate::identity::NoIdentityProvider;
    use crate::model::{Queue, WorkProfile};

    fn setup() -> (ConfigurationPublisher, Arc<BranchService>, Arc<EventBus>) {
        let config = Arc::new(BranchEngineConfig::default());
        let bus = Arc::new(EventBus::from_config(&config));
        let store = Arc::new(BranchService::new(config, bus.clone(), Arc::new(NoIdentityProvider)));
        (ConfigurationPublisher::new(store.clone()), store, bus)
    }

    fn set(branches: Vec<Branch>) -> HashMap<String, Branch> {
        branches.into_iter().map(|b| (b.id.clone(), b)).collect()
    }

    #[test]
    fn test_publish_replaces_set_and_reports_progress() {
        let (publisher, store, bus) = setup();
        publisher.publish(set(vec![Branch::new("a", "A"), Branch::new("old", "Old")])).unwrap();
        bus.clear_history();

        let held = publisher
            .publish(set(vec![Branch::new("a", "A2"), Branch::new("b", "B")]))
            .unwrap();
        let mut ids: Vec<&String> = held.keys().collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!store.branch_exists("old"));

        let progress: Vec<String> = bus
            .history_for(BROADCAST)
            .iter()
            .map(|p| p.notification.event_type.clone())
            .collect();
        assert_eq!(progress.first().map(String::as_str), Some("PUBLIC_STARTED"));
        assert_eq!(progress.last().map(String::as_str), Some("PUBLIC_COMPLETE"));
        assert_eq!(progress.iter().filter(|t| *t == "BRANCH_PUBLIC_COMPLETE").count(), 2);
        assert_eq!(bus.history_for(CONFIG).len(), 3);
    }

    #[test]
    fn test_failed_publish_restores_previous_set() {
        let (publisher, store, bus) = setup();
        let original = Branch::new("a", "A").with_queue(Queue::new("q1", "Cash", "A"));
        publisher.publish(set(vec![original])).unwrap();
        let before = store.detailed_branches();
        bus.clear_history();

        let broken = Branch::new("b", "B").with_work_profile(WorkProfile::new("wp", "x").with_queue("missing"));
        let err = publisher
            .publish(set(vec![Branch::new("a", "A changed"), broken]))
            .unwrap_err();

        assert!(matches!(err, BranchError::NotFound(_)));
        assert_eq!(store.detailed_branches(), before);
        let types = bus.event_types();
        assert!(types.contains(&"PUBLIC_FAILED".to_string()));
        assert!(types.contains(&"ROLLBACK_COMPLETE".to_string()));
        assert!(!types.contains(&"PUBLIC_COMPLETE".to_string()));
        assert!(bus.history_for(CONFIG).is_empty());
    }
}
