//! # Branch store
//!
//! Holds the authoritative in-memory set of branches and serializes access
//! to them.
//!
//! ## Locking
//!
//! - Each branch sits behind its own `parking_lot::RwLock`: mutations of one
//!   branch are exclusive, reads see a consistent snapshot, and different
//!   branches never contend.
//! - A set-wide `RwLock<()>` is taken shared by every single-branch operation
//!   and exclusively by configuration publishing, which therefore sees and
//!   restores a consistent "before" state.
//! - Notifications are dispatched after the branch lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::visit_service::finish_current_visit;
use crate::config::BranchEngineConfig;
use crate::error::{BranchError, Result};
use crate::events::{dispatch, NotificationPublisher, Outbox};
use crate::identity::IdentityProvider;
use crate::model::{Branch, CloseOptions, Placement, User, Visit, VisitEvent};
use crate::rules::SegmentationRule;

/// Short description of a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub id: String,
    pub name: String,
    pub prefix: String,
}

impl From<&Branch> for BranchSummary {
    fn from(branch: &Branch) -> Self {
        Self {
            id: branch.id.clone(),
            name: branch.name.clone(),
            prefix: branch.prefix.clone(),
        }
    }
}

/// Authoritative branch set
pub struct BranchService {
    branches: DashMap<String, Arc<RwLock<Branch>>>,
    set_lock: RwLock<()>,
    publisher: Arc<dyn NotificationPublisher>,
    identity: Arc<dyn IdentityProvider>,
    segmentation: Arc<SegmentationRule>,
    config: Arc<BranchEngineConfig>,
}

impl BranchService {
    pub fn new(
        config: Arc<BranchEngineConfig>,
        publisher: Arc<dyn NotificationPublisher>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            branches: DashMap::new(),
            set_lock: RwLock::new(()),
            publisher,
            identity,
            segmentation: Arc::new(SegmentationRule::default()),
            config,
        }
    }

    /// Use a specific segmentation rule (for a non-default script evaluator)
    pub fn with_segmentation(mut self, segmentation: SegmentationRule) -> Self {
        self.segmentation = Arc::new(segmentation);
        self
    }

    pub fn config(&self) -> &BranchEngineConfig {
        &self.config
    }

    pub fn segmentation(&self) -> &SegmentationRule {
        &self.segmentation
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub(crate) fn dispatch(&self, outbox: Outbox) {
        dispatch(self.publisher.as_ref(), &self.config.events, outbox);
    }

    fn handle(&self, branch_id: &str) -> Result<Arc<RwLock<Branch>>> {
        self.branches
            .get(branch_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BranchError::not_found(format!("Branch {} not found", branch_id)))
    }

    // ---- reads -----------------------------------------------------------

    pub fn branch_exists(&self, branch_id: &str) -> bool {
        let _set = self.set_lock.read();
        self.branches.contains_key(branch_id)
    }

    /// Snapshot of one branch
    pub fn get_branch(&self, branch_id: &str) -> Result<Branch> {
        self.with_branch(branch_id, Branch::clone)
    }

    /// Run `f` against a consistent view of one branch
    pub fn with_branch<T>(&self, branch_id: &str, f: impl FnOnce(&Branch) -> T) -> Result<T> {
        let _set = self.set_lock.read();
        let handle = self.handle(branch_id)?;
        let branch = handle.read();
        Ok(f(&branch))
    }

    pub fn branches(&self) -> Vec<BranchSummary> {
        let _set = self.set_lock.read();
        let mut summaries: Vec<BranchSummary> = self.snapshot_all().values().map(BranchSummary::from).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn detailed_branches(&self) -> HashMap<String, Branch> {
        let _set = self.set_lock.read();
        self.snapshot_all()
    }

    /// Branches whose prefix or name matches one of the user's groups
    ///
    /// The identity lookup runs before the set lock is taken.
    pub fn user_branches(&self, user_name: &str) -> Vec<BranchSummary> {
        let groups = self.identity.branches_of_user(user_name);
        self.branches()
            .into_iter()
            .filter(|b| {
                groups
                    .iter()
                    .any(|g| (!b.prefix.is_empty() && g.name == b.prefix) || g.name == b.name)
            })
            .collect()
    }

    // ---- writes ----------------------------------------------------------

    /// Run `f` with exclusive access to one branch, then dispatch what it
    /// put in the outbox
    pub fn with_branch_mut<T>(
        &self,
        branch_id: &str,
        f: impl FnOnce(&mut Branch, &mut Outbox) -> Result<T>,
    ) -> Result<T> {
        let mut outbox = Outbox::new();
        let result = {
            let _set = self.set_lock.read();
            self.handle(branch_id).and_then(|handle| {
                let mut branch = handle.write();
                f(&mut branch, &mut outbox)
            })
        };
        self.finish(result, outbox)
    }

    /// Dispatch the outbox of a committed operation, or only the error of a
    /// rejected one
    fn finish<T>(&self, result: Result<T>, outbox: Outbox) -> Result<T> {
        match &result {
            Ok(_) => self.dispatch(outbox),
            Err(err) => self.dispatch(Outbox::rejected(err)),
        }
        result
    }

    /// Add a branch or replace an existing one wholesale
    pub fn add(&self, branch: Branch) -> Result<Branch> {
        let mut outbox = Outbox::new();
        let result = {
            let _set = self.set_lock.read();
            self.add_unlocked(branch, &mut outbox)
        };
        self.finish(result, outbox)
    }

    /// Remove a branch, closing its occupied service points first
    pub fn delete(&self, branch_id: &str) -> Result<()> {
        let mut outbox = Outbox::new();
        let result = {
            let _set = self.set_lock.read();
            self.delete_unlocked(branch_id, &mut outbox)
        };
        self.finish(result, outbox)
    }

    pub fn increment_ticket_counter(&self, branch_id: &str, queue_id: &str) -> Result<i64> {
        self.with_branch_mut(branch_id, |branch, _| Ok(branch.increment_ticket_counter(queue_id)))
    }

    /// Apply a visit event inside the visit's own branch
    pub fn update_visit(&self, visit: Visit, event: VisitEvent, placement: Placement) -> Result<Visit> {
        let branch_id = visit.branch_id.clone();
        self.with_branch_mut(&branch_id, |branch, outbox| {
            branch.update_visit(visit, event, placement, outbox)
        })
    }

    /// Log `user_name` into a service point under a work profile
    ///
    /// The user record is taken from the branch when known, otherwise built
    /// from the identity provider (or from the bare name).
    pub fn open_service_point(
        &self,
        branch_id: &str,
        user_name: &str,
        service_point_id: &str,
        work_profile_id: &str,
    ) -> Result<User> {
        if let Some(role) = &self.config.service_points.required_role {
            if !self.identity.is_user_in_role(user_name, role) {
                warn!("⛔ {} may not open {}: missing role {}", user_name, service_point_id, role);
                return self.finish(
                    Err(BranchError::forbidden(format!("{} lacks role {}", user_name, role))),
                    Outbox::new(),
                );
            }
        }
        let info = self.identity.user_info(user_name);

        self.with_branch_mut(branch_id, |branch, outbox| {
            let mut user = match branch.find_user_by_name(user_name) {
                Some(known) => known.clone(),
                None => match &info {
                    Some(info) => {
                        let mut user = User::new(info.id.clone(), info.name.clone());
                        user.first_name = info.first_name.clone();
                        user.last_name = info.last_name.clone();
                        user.email = info.email.clone();
                        user
                    }
                    None => User::new(Uuid::new_v4().to_string(), user_name),
                },
            };
            user.service_point_id = Some(service_point_id.to_string());
            user.current_work_profile_id = Some(work_profile_id.to_string());
            branch.open_service_point(user, outbox)
        })
    }

    /// Close a service point, optionally ending its visit, logging the user
    /// out and starting a break
    pub fn close_service_point(&self, branch_id: &str, service_point_id: &str, options: &CloseOptions) -> Result<User> {
        let user = self.with_branch_mut(branch_id, |branch, outbox| {
            self.close_in_branch(branch, service_point_id, options, outbox)
        })?;

        if options.logout {
            self.logout(&user);
        }
        Ok(user)
    }

    fn close_in_branch(
        &self,
        branch: &mut Branch,
        service_point_id: &str,
        options: &CloseOptions,
        outbox: &mut Outbox,
    ) -> Result<User> {
        let serving = branch
            .service_points
            .get(service_point_id)
            .is_some_and(|sp| sp.is_open() && sp.current_visit.is_some());
        if options.end_visit && serving {
            finish_current_visit(branch, service_point_id, &self.segmentation, outbox)?;
        }
        branch.close_service_point(service_point_id, options, outbox)
    }

    fn logout(&self, user: &User) {
        let reason = &self.config.service_points.logout_reason;
        if let Err(e) = self.identity.force_logout(&user.id, true, reason) {
            warn!("⚠️ Forced logout of {} failed: {:#}", user.name, e);
        }
    }

    // ---- set-wide, used by configuration publishing ------------------------

    pub(crate) fn lock_set(&self) -> RwLockWriteGuard<'_, ()> {
        self.set_lock.write()
    }

    pub(crate) fn snapshot_all(&self) -> HashMap<String, Branch> {
        self.branches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().read().clone()))
            .collect()
    }

    /// Put back exactly `snapshot` as the branch set
    pub(crate) fn restore(&self, snapshot: HashMap<String, Branch>) {
        self.branches.retain(|id, _| snapshot.contains_key(id));
        for (id, branch) in snapshot {
            let existing = self.branches.get(&id).map(|entry| Arc::clone(entry.value()));
            match existing {
                Some(handle) => *handle.write() = branch,
                None => {
                    self.branches.insert(id, Arc::new(RwLock::new(branch)));
                }
            }
        }
    }

    pub(crate) fn add_unlocked(&self, mut branch: Branch, outbox: &mut Outbox) -> Result<Branch> {
        branch.validate()?;
        branch.stamp_branch_id();

        let existing = self.branches.get(&branch.id).map(|entry| Arc::clone(entry.value()));
        match existing {
            Some(handle) => {
                let mut current = handle.write();
                outbox.changed("Branch", "BRANCH_CHANGED", Some(&*current), Some(&branch));
                *current = branch.clone();
                info!("🏢 Replaced branch {}", branch.id);
            }
            None => {
                outbox.changed::<Branch>("Branch", "BRANCH_CREATED", None, Some(&branch));
                self.branches
                    .insert(branch.id.clone(), Arc::new(RwLock::new(branch.clone())));
                info!("🏢 Added branch {}", branch.id);
            }
        }
        Ok(branch)
    }

    pub(crate) fn delete_unlocked(&self, branch_id: &str, outbox: &mut Outbox) -> Result<()> {
        let handle = self.handle(branch_id)?;
        {
            let mut branch = handle.write();
            let occupied: Vec<String> = branch
                .service_points
                .values()
                .filter(|sp| sp.is_open())
                .map(|sp| sp.id.clone())
                .collect();
            for sp_id in occupied {
                debug!("Force-closing {} before deleting branch {}", sp_id, branch_id);
                branch.close_service_point(&sp_id, &CloseOptions::default(), outbox)?;
            }
            outbox.changed::<Branch>("Branch", "BRANCH_DELETED", Some(&*branch), None);
        }
        self.branches.remove(branch_id);
        info!("🗑️ Deleted branch {}", branch_id);
        Ok(())
    }
}
