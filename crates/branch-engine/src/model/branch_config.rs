//! Configuration editing on a live branch.
//!
//! Every operation validates its whole input first and only then mutates,
//! so a rejected batch changes nothing. Each applied change is reported as
//! an `ENTITY_CHANGED` record on the config channel.

use std::collections::HashMap;

use tracing::{debug, info};

use super::branch::Branch;
use super::catalog::{SegmentationRuleData, Service, ServiceGroup, WorkProfile};
use super::queue::Queue;
use super::service_point::ServicePoint;
use crate::error::{BranchError, Result};
use crate::events::Outbox;

impl Branch {
    fn ensure_services_unused<'a>(&self, ids: impl Iterator<Item = &'a String>, verb: &str) -> Result<()> {
        for id in ids {
            if let Some(visit) = self.visits().into_iter().find(|v| v.has_service(id)) {
                return Err(BranchError::conflict(format!(
                    "{} service {} is in use by visit {}",
                    verb, id, visit.id
                )));
            }
        }
        Ok(())
    }

    /// Add or replace services
    ///
    /// With `check_visits` the snapshots held by visits are refreshed;
    /// without it, replacing a service some visit refers to is a `Conflict`.
    pub fn add_update_services(
        &mut self,
        services: HashMap<String, Service>,
        check_visits: bool,
        outbox: &mut Outbox,
    ) -> Result<()> {
        for service in services.values() {
            if let Some(q) = service.linked_queue_id.as_ref().filter(|q| !self.queues.contains_key(*q)) {
                return Err(BranchError::not_found(format!(
                    "Service {} is linked to unknown queue {}",
                    service.id, q
                )));
            }
        }
        if !check_visits {
            self.ensure_services_unused(
                services.keys().filter(|id| self.services.contains_key(*id)),
                "Updated",
            )?;
        }

        for (id, mut service) in services {
            service.branch_id = Some(self.id.clone());
            if let Some(old) = self.services.get(&id) {
                // Group membership is owned by the service groups.
                if service.service_group_id.is_none() {
                    service.service_group_id = old.service_group_id.clone();
                }
                outbox.changed("Service", "Update service", Some(old), Some(&service));
            } else {
                outbox.changed::<Service>("Service", "Add service", None, Some(&service));
            }

            if check_visits {
                for visit in self.visits_mut() {
                    let refresh = |s: &mut Service| {
                        if s.id == id {
                            *s = service.clone();
                        }
                    };
                    visit.current_service.iter_mut().for_each(refresh);
                    visit.served_services.iter_mut().for_each(refresh);
                    visit.unserved_services.iter_mut().for_each(refresh);
                }
            }
            self.services.insert(id, service);
        }
        info!("📋 Services updated in branch {}", self.id);
        Ok(())
    }

    /// Remove services
    ///
    /// With `check_visits` the services are stripped from visits (a visit
    /// whose current service goes away moves on to its next unserved one);
    /// without it, deleting a service in use is a `Conflict`.
    pub fn delete_services(&mut self, service_ids: &[String], check_visits: bool, outbox: &mut Outbox) -> Result<()> {
        if !check_visits {
            self.ensure_services_unused(service_ids.iter(), "Deleted")?;
        }

        for id in service_ids {
            let Some(old) = self.services.remove(id) else {
                debug!("Service {} not present in branch {}, skipping", id, self.id);
                continue;
            };

            if check_visits {
                for visit in self.visits_mut() {
                    if visit.current_service.as_ref().is_some_and(|s| &s.id == id) {
                        visit.current_service = if visit.unserved_services.is_empty() {
                            None
                        } else {
                            Some(visit.unserved_services.remove(0))
                        };
                    }
                    visit.unserved_services.retain(|s| &s.id != id);
                    visit.served_services.retain(|s| &s.id != id);
                }
            }
            for group in self.service_groups.values_mut() {
                group.service_ids.retain(|s| s != id);
            }
            outbox.changed::<Service>("Service", "Delete service", Some(&old), None);
        }
        Ok(())
    }

    /// Add or replace service points, optionally carrying over the visits
    /// and user of the point being replaced
    pub fn add_update_service_points(
        &mut self,
        service_points: HashMap<String, ServicePoint>,
        keep_visits: bool,
        keep_user: bool,
        outbox: &mut Outbox,
    ) -> Result<()> {
        for sp in service_points.values() {
            if let Some(user) = sp.user_id.as_ref().filter(|u| !self.users.contains_key(*u)) {
                return Err(BranchError::not_found(format!(
                    "Service point {} names unknown user {}",
                    sp.id, user
                )));
            }
        }

        for (id, mut sp) in service_points {
            sp.branch_id = Some(self.id.clone());
            match self.service_points.remove(&id) {
                Some(old) => {
                    if keep_visits {
                        sp.current_visit = old.current_visit.clone();
                        sp.pool = old.pool.clone();
                    }
                    if keep_user && old.user_id.is_some() {
                        sp.user_id = old.user_id.clone();
                    } else if let Some(user) = old.user_id.as_ref().and_then(|u| self.users.get_mut(u)) {
                        if sp.user_id.as_ref() != Some(&user.id) {
                            user.service_point_id = None;
                        }
                    }
                    outbox.changed("ServicePoint", "Update service point", Some(&old), Some(&sp));
                }
                None => outbox.changed::<ServicePoint>("ServicePoint", "Add service point", None, Some(&sp)),
            }
            if let Some(user) = sp.user_id.as_ref().and_then(|u| self.users.get_mut(u)) {
                user.service_point_id = Some(id.clone());
            }
            self.service_points.insert(id, sp);
        }
        Ok(())
    }

    pub fn delete_service_points(&mut self, service_point_ids: &[String], outbox: &mut Outbox) {
        for id in service_point_ids {
            let Some(old) = self.service_points.remove(id) else {
                continue;
            };
            if let Some(user) = old.user_id.as_ref().and_then(|u| self.users.get_mut(u)) {
                user.service_point_id = None;
            }
            outbox.changed::<ServicePoint>("ServicePoint", "Delete service point", Some(&old), None);
        }
    }

    /// Add or replace queues, optionally keeping the waiting visits and the
    /// ticket counter of the queue being replaced
    pub fn add_update_queues(&mut self, queues: HashMap<String, Queue>, keep_visits: bool, outbox: &mut Outbox) {
        for (id, mut queue) in queues {
            queue.branch_id = Some(self.id.clone());
            match self.queues.remove(&id) {
                Some(old) => {
                    if keep_visits {
                        let mut visits = old.visits.clone();
                        visits.append(&mut queue.visits);
                        queue.visits = visits;
                        queue.ticket_counter = old.ticket_counter;
                    }
                    outbox.changed("Queue", "Update queue", Some(&old), Some(&queue));
                }
                None => outbox.changed::<Queue>("Queue", "Add queue", None, Some(&queue)),
            }
            self.queues.insert(id, queue);
        }
    }

    /// Remove queues and drop them from every work profile
    pub fn delete_queues(&mut self, queue_ids: &[String], outbox: &mut Outbox) {
        for id in queue_ids {
            let Some(old) = self.queues.remove(id) else {
                continue;
            };
            for wp in self.work_profiles.values_mut() {
                wp.queue_ids.retain(|q| q != id);
            }
            outbox.changed::<Queue>("Queue", "Delete queue", Some(&old), None);
        }
    }

    /// Add or replace service groups; every listed service must exist and
    /// gets the group stamped on it
    pub fn add_update_service_groups(&mut self, groups: HashMap<String, ServiceGroup>, outbox: &mut Outbox) -> Result<()> {
        for group in groups.values() {
            if let Some(missing) = group.service_ids.iter().find(|s| !self.services.contains_key(*s)) {
                return Err(BranchError::not_found(format!("Service {} not found!", missing)));
            }
        }

        for (id, mut group) in groups {
            group.branch_id = Some(self.id.clone());
            for service_id in &group.service_ids {
                if let Some(service) = self.services.get_mut(service_id) {
                    service.service_group_id = Some(id.clone());
                }
            }
            let old = self.service_groups.insert(id, group.clone());
            outbox.changed("ServiceGroup", "Add or update service group", old.as_ref(), Some(&group));
        }
        Ok(())
    }

    /// Add or replace segmentation rules; their service group and target
    /// queue must exist
    pub fn add_update_segmentation_rules(
        &mut self,
        rules: HashMap<String, SegmentationRuleData>,
        outbox: &mut Outbox,
    ) -> Result<()> {
        for rule in rules.values() {
            if let Some(group) = rule.service_group_id.as_ref().filter(|g| !self.service_groups.contains_key(*g)) {
                return Err(BranchError::not_found(format!("Service group {} not found!", group)));
            }
            if !self.queues.contains_key(&rule.queue_id) {
                return Err(BranchError::not_found(format!("Queue {} not found!", rule.queue_id)));
            }
        }

        for (id, rule) in rules {
            let old = self.segmentation_rules.insert(id, rule.clone());
            outbox.changed("SegmentationRuleData", "Add or update segmentation rule", old.as_ref(), Some(&rule));
        }
        Ok(())
    }

    /// Add or replace work profiles; every reachable queue must exist
    pub fn add_update_work_profiles(&mut self, profiles: HashMap<String, WorkProfile>, outbox: &mut Outbox) -> Result<()> {
        for wp in profiles.values() {
            if let Some(missing) = wp.queue_ids.iter().find(|q| !self.queues.contains_key(*q)) {
                return Err(BranchError::not_found(format!("Queue {} not found!", missing)));
            }
        }

        for (id, mut wp) in profiles {
            wp.branch_id = Some(self.id.clone());
            let old = self.work_profiles.insert(id, wp.clone());
            outbox.changed("WorkProfile", "Add or update work profile", old.as_ref(), Some(&wp));
        }
        Ok(())
    }
}
