//! # Branch aggregate
//!
//! A [`Branch`] owns every queue, service point, user, service and rule of
//! one branch office. All visit movement funnels through
//! [`Branch::update_visit`], which enforces two properties:
//!
//! - **single placement**: after any call a visit sits in at most one of
//!   {service point slot, queue, service point pool, user pool};
//! - **all or nothing**: every check runs before the first container is
//!   touched, so a rejected call leaves the branch exactly as it was.
//!
//! Methods here never publish anything themselves. They describe what
//! happened by filling the caller's [`Outbox`]; rejected calls add a single
//! `BUSINESS_ERROR` entry.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::catalog::{Mark, ScriptRule, SegmentationRuleData, Service, ServiceGroup, WorkProfile};
use super::queue::Queue;
use super::service_point::ServicePoint;
use super::user::User;
use super::visit::{PlacementTarget, TargetKind, Visit, VisitEvent, VisitState};
use super::Placement;
use crate::error::{BranchError, Result};
use crate::events::Outbox;
use crate::rules::CallRuleKind;

/// Options for closing a service point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseOptions {
    /// End the visit currently being served before closing
    pub end_visit: bool,
    /// Ask the identity provider to terminate the user's session
    pub logout: bool,
    /// Put the user on break with this reason
    pub break_reason: Option<String>,
}

/// Aggregate root for one branch office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    /// Matched against identity-provider group names to find a user's
    /// branches
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub address: String,
    /// Call rule for this branch; the engine default applies when unset
    #[serde(default)]
    pub call_rule: Option<CallRuleKind>,

    #[serde(default)]
    pub queues: HashMap<String, Queue>,
    #[serde(default)]
    pub service_points: HashMap<String, ServicePoint>,
    /// Keyed by user id
    #[serde(default)]
    pub users: HashMap<String, User>,
    #[serde(default)]
    pub services: HashMap<String, Service>,
    #[serde(default)]
    pub work_profiles: HashMap<String, WorkProfile>,
    #[serde(default)]
    pub service_groups: HashMap<String, ServiceGroup>,
    #[serde(default)]
    pub segmentation_rules: HashMap<String, SegmentationRuleData>,
    #[serde(default)]
    pub custom_segmentation_rules: HashMap<String, ScriptRule>,
    #[serde(default)]
    pub marks: HashMap<String, Mark>,
    #[serde(default)]
    pub break_reasons: HashMap<String, String>,
}

impl Branch {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prefix: String::new(),
            address: String::new(),
            call_rule: None,
            queues: HashMap::new(),
            service_points: HashMap::new(),
            users: HashMap::new(),
            services: HashMap::new(),
            work_profiles: HashMap::new(),
            service_groups: HashMap::new(),
            segmentation_rules: HashMap::new(),
            custom_segmentation_rules: HashMap::new(),
            marks: HashMap::new(),
            break_reasons: HashMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_call_rule(mut self, kind: CallRuleKind) -> Self {
        self.call_rule = Some(kind);
        self
    }

    pub fn with_queue(mut self, queue: Queue) -> Self {
        self.queues.insert(queue.id.clone(), queue);
        self
    }

    pub fn with_service_point(mut self, service_point: ServicePoint) -> Self {
        self.service_points.insert(service_point.id.clone(), service_point);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.insert(service.id.clone(), service);
        self
    }

    pub fn with_work_profile(mut self, work_profile: WorkProfile) -> Self {
        self.work_profiles.insert(work_profile.id.clone(), work_profile);
        self
    }

    pub fn with_service_group(mut self, group: ServiceGroup) -> Self {
        for service_id in &group.service_ids {
            if let Some(service) = self.services.get_mut(service_id) {
                service.service_group_id = Some(group.id.clone());
            }
        }
        self.service_groups.insert(group.id.clone(), group);
        self
    }

    pub fn with_segmentation_rule(mut self, rule: SegmentationRuleData) -> Self {
        self.segmentation_rules.insert(rule.id.clone(), rule);
        self
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.insert(mark.id.clone(), mark);
        self
    }

    pub fn with_script_rule(mut self, rule: ScriptRule) -> Self {
        self.custom_segmentation_rules.insert(rule.id.clone(), rule);
        self
    }

    /// Bind `user` to an existing service point without going through the
    /// open flow; used when building fixtures and restoring snapshots
    pub fn with_user_at(mut self, mut user: User, service_point_id: &str) -> Self {
        user.service_point_id = Some(service_point_id.to_string());
        if let Some(sp) = self.service_points.get_mut(service_point_id) {
            sp.user_id = Some(user.id.clone());
        }
        self.users.insert(user.id.clone(), user);
        self
    }

    /// Stamp this branch's id on every owned entity
    pub fn stamp_branch_id(&mut self) {
        let id = Some(self.id.clone());
        self.queues.values_mut().for_each(|q| q.branch_id = id.clone());
        self.service_points.values_mut().for_each(|sp| sp.branch_id = id.clone());
        self.users.values_mut().for_each(|u| u.branch_id = id.clone());
        self.services.values_mut().for_each(|s| s.branch_id = id.clone());
        self.work_profiles.values_mut().for_each(|wp| wp.branch_id = id.clone());
        self.service_groups.values_mut().for_each(|g| g.branch_id = id.clone());
    }

    // ---- ticket sequencer ------------------------------------------------

    /// Bump and return the ticket counter of one of this branch's queues
    ///
    /// Returns `-1` for a queue id this branch does not own.
    pub fn increment_ticket_counter(&mut self, queue_id: &str) -> i64 {
        match self.queues.get_mut(queue_id) {
            Some(queue) => {
                queue.ticket_counter += 1;
                queue.ticket_counter
            }
            None => -1,
        }
    }

    // ---- queries ---------------------------------------------------------

    /// Every visit currently held anywhere in the branch
    pub fn visits(&self) -> Vec<&Visit> {
        let mut visits: Vec<&Visit> = Vec::new();
        for queue in self.queues.values() {
            visits.extend(queue.visits.iter());
        }
        for sp in self.service_points.values() {
            visits.extend(sp.current_visit.iter());
            visits.extend(sp.pool.iter());
        }
        for user in self.users.values() {
            visits.extend(user.pool.iter());
        }
        visits
    }

    pub(crate) fn visits_mut(&mut self) -> Vec<&mut Visit> {
        let mut visits: Vec<&mut Visit> = Vec::new();
        for queue in self.queues.values_mut() {
            visits.extend(queue.visits.iter_mut());
        }
        for sp in self.service_points.values_mut() {
            visits.extend(sp.current_visit.iter_mut());
            visits.extend(sp.pool.iter_mut());
        }
        for user in self.users.values_mut() {
            visits.extend(user.pool.iter_mut());
        }
        visits
    }

    pub fn find_visit(&self, visit_id: &str) -> Option<&Visit> {
        self.visits().into_iter().find(|v| v.id == visit_id)
    }

    pub fn visits_by_status(&self, statuses: &[VisitState]) -> Vec<&Visit> {
        self.visits()
            .into_iter()
            .filter(|v| statuses.contains(&v.status))
            .collect()
    }

    /// Container actually holding `visit_id`, independent of its pointers
    pub fn locate(&self, visit_id: &str) -> Option<PlacementTarget> {
        if let Some(q) = self.queues.values().find(|q| q.contains(visit_id)) {
            return Some(PlacementTarget::Queue(q.id.clone()));
        }
        for sp in self.service_points.values() {
            if sp.current_visit.as_ref().is_some_and(|v| v.id == visit_id) {
                return Some(PlacementTarget::ServicePoint(sp.id.clone()));
            }
            if sp.pool.iter().any(|v| v.id == visit_id) {
                return Some(PlacementTarget::ServicePointPool(sp.id.clone()));
            }
        }
        self.users
            .values()
            .find(|u| u.pool.iter().any(|v| v.id == visit_id))
            .map(|u| PlacementTarget::UserPool(u.id.clone()))
    }

    pub fn find_user_by_name(&self, name: &str) -> Option<&User> {
        self.users.values().find(|u| u.name == name)
    }

    /// User bound to a service point
    pub fn service_point_user(&self, service_point_id: &str) -> Option<&User> {
        let sp = self.service_points.get(service_point_id)?;
        sp.user_id.as_ref().and_then(|id| self.users.get(id))
    }

    /// Work profile of the user bound to `service_point_id`
    ///
    /// `Forbidden` when nobody is bound or the profile is unknown here.
    pub fn work_profile_at(&self, service_point_id: &str) -> Result<&WorkProfile> {
        let sp = self.service_points.get(service_point_id).ok_or_else(|| {
            BranchError::not_found(format!("Service point {} not found in {}", service_point_id, self.id))
        })?;
        let user = sp
            .user_id
            .as_ref()
            .and_then(|id| self.users.get(id))
            .ok_or_else(|| {
                BranchError::forbidden(format!("User not logged in at service point {}", service_point_id))
            })?;
        user.current_work_profile_id
            .as_ref()
            .and_then(|wp| self.work_profiles.get(wp))
            .ok_or_else(|| {
                BranchError::forbidden(format!(
                    "User {} at service point {} has an unknown work profile",
                    user.name, service_point_id
                ))
            })
    }

    // ---- visit movement --------------------------------------------------

    /// Move a visit according to `event`
    ///
    /// The visit's pointer matching the event's target kind selects the
    /// destination; stale pointers of other kinds are cleared. `END`,
    /// `NO_SHOW` and `DELETED` take the visit out of every container.
    /// Returns the visit as stored.
    pub fn update_visit(
        &mut self,
        visit: Visit,
        event: VisitEvent,
        placement: Placement,
        outbox: &mut Outbox,
    ) -> Result<Visit> {
        let visit_id = visit.id.clone();
        match self.apply_visit_event(visit, event, placement) {
            Ok(visit) => {
                debug!("🔀 Visit {} -> {} in branch {}", visit.id, visit.status, self.id);
                outbox.visit_event(event, &visit);
                Ok(visit)
            }
            Err(err) => {
                warn!("⛔ Visit {} rejected {} in branch {}: {}", visit_id, event, self.id, err);
                outbox.business_error(&err);
                Err(err)
            }
        }
    }

    fn apply_visit_event(&mut self, mut visit: Visit, event: VisitEvent, placement: Placement) -> Result<Visit> {
        if event.is_annotation() {
            return Err(BranchError::invalid_input(format!(
                "Event {} annotates visit {} in place and cannot move it",
                event, visit.id
            )));
        }
        let previous = visit.last_transition();
        if !event.can_follow(previous) {
            return Err(BranchError::conflict(format!(
                "Visit {} cannot go from {} to {}",
                visit.id,
                previous.map(|e| e.as_str()).unwrap_or("nothing"),
                event
            )));
        }

        let target = match event.target_kind() {
            Some(kind) => Some(visit.pointer(kind).ok_or_else(|| {
                BranchError::invalid_input(format!("Event {} needs a {:?} target for visit {}", event, kind, visit.id))
            })?),
            None => None,
        };

        if let Some(target) = &target {
            self.check_target(&visit.id, target, placement)?;
        }

        // Past this point nothing can fail.
        self.detach(&visit.id);

        let now = Utc::now();
        let mut parameters = HashMap::new();
        visit.branch_id = self.id.clone();
        if let Some(state) = event.terminal_state() {
            visit.status = state;
        }
        match &target {
            Some(target) => {
                visit.place_at(target);
                parameters.insert(target_param(target.kind()).to_string(), target.id().to_string());
            }
            None => {
                visit.clear_placement();
                if matches!(event, VisitEvent::End | VisitEvent::Deleted) {
                    visit.end_date_time = Some(now);
                }
            }
        }
        visit.record_event(event, now, parameters);

        if let Some(target) = &target {
            self.insert(target, visit.clone(), placement);
        }
        Ok(visit)
    }

    fn check_target(&self, visit_id: &str, target: &PlacementTarget, placement: Placement) -> Result<()> {
        match target {
            PlacementTarget::ServicePoint(id) => {
                let sp = self.service_point(id)?;
                if sp.is_busy_with_other(visit_id) {
                    let current = sp.current_visit.as_ref().map(|v| v.id.as_str()).unwrap_or_default();
                    return Err(BranchError::conflict(format!(
                        "Service point {} is already serving visit {}",
                        id, current
                    )));
                }
                Ok(())
            }
            PlacementTarget::Queue(id) => {
                let queue = self
                    .queues
                    .get(id)
                    .ok_or_else(|| BranchError::not_found(format!("Queue {} not found in {}", id, self.id)))?;
                check_position(&queue.visits, visit_id, placement, "queue", id)
            }
            PlacementTarget::ServicePointPool(id) => {
                check_position(&self.service_point(id)?.pool, visit_id, placement, "service point pool", id)
            }
            PlacementTarget::UserPool(id) => {
                let user = self
                    .users
                    .get(id)
                    .ok_or_else(|| BranchError::not_found(format!("User {} not found in {}", id, self.id)))?;
                check_position(&user.pool, visit_id, placement, "user pool", id)
            }
        }
    }

    fn service_point(&self, id: &str) -> Result<&ServicePoint> {
        self.service_points
            .get(id)
            .ok_or_else(|| BranchError::not_found(format!("Service point {} not found in {}", id, self.id)))
    }

    /// Place an already validated visit
    fn insert(&mut self, target: &PlacementTarget, visit: Visit, placement: Placement) {
        let list = match target {
            PlacementTarget::ServicePoint(id) => {
                if let Some(sp) = self.service_points.get_mut(id) {
                    sp.current_visit = Some(visit);
                }
                return;
            }
            PlacementTarget::Queue(id) => self.queues.get_mut(id).map(|q| &mut q.visits),
            PlacementTarget::ServicePointPool(id) => self.service_points.get_mut(id).map(|sp| &mut sp.pool),
            PlacementTarget::UserPool(id) => self.users.get_mut(id).map(|u| &mut u.pool),
        };
        if let Some(list) = list {
            let at = placement.position(list.len()).unwrap_or(list.len());
            list.insert(at, visit);
        }
    }

    /// Edit the visit in the current slot of `service_point_id` where it
    /// stands and record `event` in its history
    ///
    /// `edit` works on a copy, so a rejection leaves the slot untouched.
    pub fn annotate_current_visit(
        &mut self,
        service_point_id: &str,
        event: VisitEvent,
        edit: impl FnOnce(&Branch, &mut Visit) -> Result<HashMap<String, String>>,
        outbox: &mut Outbox,
    ) -> Result<Visit> {
        let result = self.apply_annotation(service_point_id, event, edit);
        match &result {
            Ok(visit) => {
                debug!("📝 Visit {} {} at {} in branch {}", visit.id, event, service_point_id, self.id);
                outbox.visit_event(event, visit);
            }
            Err(err) => {
                warn!("⛔ {} rejected at {} in branch {}: {}", event, service_point_id, self.id, err);
                outbox.business_error(err);
            }
        }
        result
    }

    fn apply_annotation(
        &mut self,
        service_point_id: &str,
        event: VisitEvent,
        edit: impl FnOnce(&Branch, &mut Visit) -> Result<HashMap<String, String>>,
    ) -> Result<Visit> {
        if !event.is_annotation() {
            return Err(BranchError::invalid_input(format!("Event {} moves a visit", event)));
        }
        let mut visit = self
            .service_point(service_point_id)?
            .current_visit
            .clone()
            .ok_or_else(|| BranchError::not_found(format!("No visit at service point {}", service_point_id)))?;

        let mut parameters = edit(self, &mut visit)?;
        parameters.insert("servicePointId".to_string(), service_point_id.to_string());
        visit.record_event(event, Utc::now(), parameters);

        if let Some(sp) = self.service_points.get_mut(service_point_id) {
            sp.current_visit = Some(visit.clone());
        }
        Ok(visit)
    }

    /// Remove a visit from every container; absence is fine
    pub fn detach(&mut self, visit_id: &str) -> Option<Visit> {
        let mut removed = None;
        for queue in self.queues.values_mut() {
            if let Some(pos) = queue.position_of(visit_id) {
                removed = Some(queue.visits.remove(pos));
            }
        }
        for sp in self.service_points.values_mut() {
            if sp.current_visit.as_ref().is_some_and(|v| v.id == visit_id) {
                removed = sp.current_visit.take();
            }
            if let Some(pos) = sp.pool.iter().position(|v| v.id == visit_id) {
                removed = Some(sp.pool.remove(pos));
            }
        }
        for user in self.users.values_mut() {
            if let Some(pos) = user.pool.iter().position(|v| v.id == visit_id) {
                removed = Some(user.pool.remove(pos));
            }
        }
        removed
    }

    // ---- service points --------------------------------------------------

    /// Bind `user` to the service point named by `user.service_point_id`
    ///
    /// Notifications are only produced when the user's service point or
    /// work profile actually changed.
    pub fn open_service_point(&mut self, mut user: User, outbox: &mut Outbox) -> Result<User> {
        let sp_id = user
            .service_point_id
            .clone()
            .ok_or_else(|| BranchError::invalid_input(format!("User {} has no service point to open", user.name)))?;

        if let Some(wp) = &user.current_work_profile_id {
            if !self.work_profiles.contains_key(wp) {
                return Err(BranchError::not_found(format!("Work profile {} not found in {}", wp, self.id)));
            }
        }

        let sp = self.service_point(&sp_id)?;
        if let Some(bound) = sp.user_id.as_ref().filter(|bound| **bound != user.id) {
            let holder = self.users.get(bound).map(|u| u.name.as_str()).unwrap_or(bound);
            return Err(BranchError::conflict(format!(
                "Service point {} is already opened by {}",
                sp_id, holder
            )));
        }
        let already_bound = sp.is_open();

        let previous = self.users.get(&user.id).cloned();
        let now = Utc::now();
        user.branch_id = Some(self.id.clone());

        if user.end_break(now) {
            outbox.broadcast_stat_frontend("STAFF_END_BREAK", to_json(&user));
        }

        // Leaving another point releases it.
        if let Some(old_sp_id) = previous
            .as_ref()
            .and_then(|p| p.service_point_id.clone())
            .filter(|old| *old != sp_id)
        {
            if let Some(old_sp) = self.service_points.get_mut(&old_sp_id) {
                if old_sp.user_id.as_deref() == Some(user.id.as_str()) {
                    old_sp.user_id = None;
                    outbox.broadcast_stat_frontend("SERVICE_POINT_CLOSED", to_json(&*old_sp));
                }
            }
        }

        let changed = !already_bound
            || previous.as_ref().is_none_or(|p| {
                p.service_point_id != user.service_point_id
                    || p.current_work_profile_id != user.current_work_profile_id
            });

        if let Some(sp) = self.service_points.get_mut(&sp_id) {
            sp.user_id = Some(user.id.clone());
            if changed {
                outbox.broadcast_stat_frontend("SERVICE_POINT_OPENED", to_json(&*sp));
            }
        }
        if changed {
            if let Some(prev) = previous.as_ref().filter(|p| p.current_work_profile_id != user.current_work_profile_id) {
                outbox.broadcast_stat_frontend(
                    "USER_WORK_PROFILE_CHANGED",
                    json!({ "user": user.name, "old": prev.current_work_profile_id, "new": user.current_work_profile_id }),
                );
            }
            info!("🟢 {} opened service point {} in {}", user.name, sp_id, self.id);
        } else {
            debug!("{} re-opened service point {} with no change", user.name, sp_id);
        }

        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Unbind the user from a service point
    ///
    /// `Conflict` when the point is already closed. Ending the current visit
    /// and logging out are left to the caller; this only detaches the user
    /// and optionally starts their break. Returns the detached user.
    pub fn close_service_point(&mut self, service_point_id: &str, options: &CloseOptions, outbox: &mut Outbox) -> Result<User> {
        let sp = self.service_point(service_point_id)?;
        let user_id = sp
            .user_id
            .clone()
            .ok_or_else(|| BranchError::conflict(format!("Service point {} is already closed", service_point_id)))?;
        if !self.users.contains_key(&user_id) {
            return Err(BranchError::not_found(format!("User {} not found in {}", user_id, self.id)));
        }

        outbox.broadcast_stat_frontend("SERVICE_POINT_CLOSING", to_json(sp));

        let now = Utc::now();
        let mut closed_sp = None;
        if let Some(sp) = self.service_points.get_mut(service_point_id) {
            sp.user_id = None;
            closed_sp = Some(to_json(&*sp));
        }

        let mut detached = None;
        if let Some(user) = self.users.get_mut(&user_id) {
            user.service_point_id = None;
            if let Some(reason) = &options.break_reason {
                user.start_break(reason.clone(), now);
                outbox.broadcast_stat_frontend("STAFF_START_BREAK", to_json(&*user));
            }
            detached = Some(user.clone());
        }

        outbox.broadcast_stat_frontend("SERVICE_POINT_CLOSED", closed_sp.unwrap_or_default());
        info!("🔴 Service point {} closed in {}", service_point_id, self.id);

        detached.ok_or_else(|| BranchError::not_found(format!("User {} not found in {}", user_id, self.id)))
    }

    // ---- integrity -------------------------------------------------------

    /// Check cross references between the branch's records
    pub fn validate(&self) -> Result<()> {
        check_keys("queue", self.queues.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("service point", self.service_points.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("user", self.users.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("service", self.services.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("work profile", self.work_profiles.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("service group", self.service_groups.iter().map(|(k, v)| (k, &v.id)))?;
        check_keys("segmentation rule", self.segmentation_rules.iter().map(|(k, v)| (k, &v.id)))?;

        for wp in self.work_profiles.values() {
            if let Some(missing) = wp.queue_ids.iter().find(|q| !self.queues.contains_key(*q)) {
                return Err(BranchError::not_found(format!(
                    "Work profile {} references unknown queue {} in {}",
                    wp.id, missing, self.id
                )));
            }
        }

        for service in self.services.values() {
            if let Some(q) = service.linked_queue_id.as_ref().filter(|q| !self.queues.contains_key(*q)) {
                return Err(BranchError::not_found(format!(
                    "Service {} is linked to unknown queue {} in {}",
                    service.id, q, self.id
                )));
            }
        }

        for group in self.service_groups.values() {
            if let Some(missing) = group.service_ids.iter().find(|s| !self.services.contains_key(*s)) {
                return Err(BranchError::not_found(format!(
                    "Service group {} references unknown service {} in {}",
                    group.id, missing, self.id
                )));
            }
            if let Some(rule) = group
                .segmentation_rule_id
                .as_ref()
                .filter(|r| !self.custom_segmentation_rules.contains_key(*r))
            {
                return Err(BranchError::not_found(format!(
                    "Service group {} references unknown script rule {}",
                    group.id, rule
                )));
            }
        }

        for rule in self.segmentation_rules.values() {
            if let Some(group) = rule.service_group_id.as_ref().filter(|g| !self.service_groups.contains_key(*g)) {
                return Err(BranchError::not_found(format!(
                    "Segmentation rule {} references unknown service group {}",
                    rule.id, group
                )));
            }
            if !self.queues.contains_key(&rule.queue_id) {
                return Err(BranchError::not_found(format!(
                    "Segmentation rule {} targets unknown queue {}",
                    rule.id, rule.queue_id
                )));
            }
        }

        for sp in self.service_points.values() {
            if let Some(user) = sp.user_id.as_ref().filter(|u| !self.users.contains_key(*u)) {
                return Err(BranchError::configuration(format!(
                    "Service point {} is bound to unknown user {}",
                    sp.id, user
                )));
            }
        }

        Ok(())
    }
}

fn target_param(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::ServicePoint => "servicePointId",
        TargetKind::Queue => "queueId",
        TargetKind::ServicePointPool => "poolServicePointId",
        TargetKind::UserPool => "poolUserId",
    }
}

fn check_position(list: &[Visit], visit_id: &str, placement: Placement, what: &str, id: &str) -> Result<()> {
    let len = list.iter().filter(|v| v.id != visit_id).count();
    match placement.position(len) {
        Some(_) => Ok(()),
        None => Err(BranchError::conflict(format!(
            "Index {:?} is out of range for {} {} holding {} visits",
            placement, what, id, len
        ))),
    }
}

fn check_keys<'a>(what: &str, entries: impl Iterator<Item = (&'a String, &'a String)>) -> Result<()> {
    for (key, id) in entries {
        if key != id {
            return Err(BranchError::configuration(format!("{} stored under key {} has id {}", what, key, id)));
        }
    }
    Ok(())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
