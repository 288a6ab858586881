//! Visit record, lifecycle events and the transition table.
//!
//! A [`Visit`] is one customer journey through a branch. Its physical
//! location is expressed by four mutually exclusive placement pointers
//! (current slot of a service point, queue, service point pool, user pool);
//! [`Visit::target`] resolves them in a fixed precedence and
//! [`Visit::place_at`] keeps at most one of them set.
//!
//! Every change of location goes through a [`VisitEvent`]. The event decides
//! the visit's new [`VisitState`], which kind of container it must land in,
//! and which events may legally follow it. A few events only annotate the
//! visit where it stands (marks, extra services); they are kept in the
//! history but take no part in the transition table.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::{Mark, Service};

/// Parameter key marking a visit put at the head of its container by a
/// transfer; the value is the RFC 2822 timestamp of that transfer.
pub const TRANSFERRED_TO_START: &str = "isTransferredToStart";

/// Parameter key remembering the queue a visit was last called from
pub const LAST_QUEUE_ID: &str = "LastQueueId";

/// Lifecycle events a visit goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitEvent {
    Created,
    PlacedInQueue,
    Called,
    Recalled,
    Confirmed,
    NoShow,
    End,
    TransferToQueue,
    BackToQueue,
    TransferToServicePointPool,
    BackToServicePointPool,
    TransferToUserPool,
    BackToUserPool,
    Deleted,
    AddService,
    AddedMark,
    DeletedMark,
}

/// Where a visit lives after a given event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    ServicePoint,
    Queue,
    ServicePointPool,
    UserPool,
}

/// State a visit is in, named after the event that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitState {
    Created,
    PlacedInQueue,
    Called,
    Confirmed,
    NoShow,
    End,
    TransferToQueue,
    BackToQueue,
    TransferToServicePointPool,
    BackToServicePointPool,
    TransferToUserPool,
    BackToUserPool,
    Deleted,
}

impl VisitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitState::Created => "CREATED",
            VisitState::PlacedInQueue => "PLACED_IN_QUEUE",
            VisitState::Called => "CALLED",
            VisitState::Confirmed => "CONFIRMED",
            VisitState::NoShow => "NO_SHOW",
            VisitState::End => "END",
            VisitState::TransferToQueue => "TRANSFER_TO_QUEUE",
            VisitState::BackToQueue => "BACK_TO_QUEUE",
            VisitState::TransferToServicePointPool => "TRANSFER_TO_SERVICE_POINT_POOL",
            VisitState::BackToServicePointPool => "BACK_TO_SERVICE_POINT_POOL",
            VisitState::TransferToUserPool => "TRANSFER_TO_USER_POOL",
            VisitState::BackToUserPool => "BACK_TO_USER_POOL",
            VisitState::Deleted => "DELETED",
        }
    }

    /// Sitting in a queue, callable by the time-based call rules
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            VisitState::PlacedInQueue | VisitState::TransferToQueue | VisitState::BackToQueue
        )
    }

    /// Gone from the branch; no further events accepted
    pub fn is_final(&self) -> bool {
        matches!(self, VisitState::End | VisitState::NoShow | VisitState::Deleted)
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VisitEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitEvent::Created => "CREATED",
            VisitEvent::PlacedInQueue => "PLACED_IN_QUEUE",
            VisitEvent::Called => "CALLED",
            VisitEvent::Recalled => "RECALLED",
            VisitEvent::Confirmed => "CONFIRMED",
            VisitEvent::NoShow => "NO_SHOW",
            VisitEvent::End => "END",
            VisitEvent::TransferToQueue => "TRANSFER_TO_QUEUE",
            VisitEvent::BackToQueue => "BACK_TO_QUEUE",
            VisitEvent::TransferToServicePointPool => "TRANSFER_TO_SERVICE_POINT_POOL",
            VisitEvent::BackToServicePointPool => "BACK_TO_SERVICE_POINT_POOL",
            VisitEvent::TransferToUserPool => "TRANSFER_TO_USER_POOL",
            VisitEvent::BackToUserPool => "BACK_TO_USER_POOL",
            VisitEvent::Deleted => "DELETED",
            VisitEvent::AddService => "ADD_SERVICE",
            VisitEvent::AddedMark => "ADDED_MARK",
            VisitEvent::DeletedMark => "DELETED_MARK",
        }
    }

    /// Notification type published for this event
    pub fn notification_name(&self) -> String {
        format!("VISIT_{}", self.as_str())
    }

    /// Recorded in place without moving the visit or changing its state
    pub fn is_annotation(&self) -> bool {
        matches!(self, VisitEvent::AddService | VisitEvent::AddedMark | VisitEvent::DeletedMark)
    }

    /// State the visit is in after the event; `None` for annotations
    pub fn terminal_state(&self) -> Option<VisitState> {
        let state = match self {
            VisitEvent::Created => VisitState::Created,
            VisitEvent::PlacedInQueue => VisitState::PlacedInQueue,
            VisitEvent::Called | VisitEvent::Recalled => VisitState::Called,
            VisitEvent::Confirmed => VisitState::Confirmed,
            VisitEvent::NoShow => VisitState::NoShow,
            VisitEvent::End => VisitState::End,
            VisitEvent::TransferToQueue => VisitState::TransferToQueue,
            VisitEvent::BackToQueue => VisitState::BackToQueue,
            VisitEvent::TransferToServicePointPool => VisitState::TransferToServicePointPool,
            VisitEvent::BackToServicePointPool => VisitState::BackToServicePointPool,
            VisitEvent::TransferToUserPool => VisitState::TransferToUserPool,
            VisitEvent::BackToUserPool => VisitState::BackToUserPool,
            VisitEvent::Deleted => VisitState::Deleted,
            VisitEvent::AddService | VisitEvent::AddedMark | VisitEvent::DeletedMark => return None,
        };
        Some(state)
    }

    /// Container kind the visit must be addressed to; `None` means the
    /// visit leaves every container
    pub fn target_kind(&self) -> Option<TargetKind> {
        match self {
            VisitEvent::Called | VisitEvent::Recalled | VisitEvent::Confirmed => {
                Some(TargetKind::ServicePoint)
            }
            VisitEvent::PlacedInQueue | VisitEvent::TransferToQueue | VisitEvent::BackToQueue => {
                Some(TargetKind::Queue)
            }
            VisitEvent::TransferToServicePointPool | VisitEvent::BackToServicePointPool => {
                Some(TargetKind::ServicePointPool)
            }
            VisitEvent::TransferToUserPool | VisitEvent::BackToUserPool => Some(TargetKind::UserPool),
            VisitEvent::Created
            | VisitEvent::NoShow
            | VisitEvent::End
            | VisitEvent::Deleted
            | VisitEvent::AddService
            | VisitEvent::AddedMark
            | VisitEvent::DeletedMark => None,
        }
    }

    /// Whether `self` may be applied right after `previous`
    ///
    /// `None` for `previous` means the visit has no history yet, in which
    /// case only `CREATED` is accepted. Annotations are neither accepted nor
    /// expected as `previous`; see [`Visit::last_transition`].
    pub fn can_follow(&self, previous: Option<VisitEvent>) -> bool {
        use VisitEvent::*;

        let Some(previous) = previous else {
            return *self == Created;
        };

        let moves = [
            TransferToQueue,
            TransferToServicePointPool,
            TransferToUserPool,
        ];
        let returns = [BackToQueue, BackToServicePointPool, BackToUserPool];

        match previous {
            Created => matches!(self, PlacedInQueue | Called),
            PlacedInQueue | TransferToQueue | BackToQueue | TransferToServicePointPool
            | BackToServicePointPool | TransferToUserPool | BackToUserPool => {
                matches!(self, Called | End | Deleted) || moves.contains(self)
            }
            Called | Recalled => {
                matches!(self, Recalled | Confirmed | NoShow | End | Deleted)
                    || moves.contains(self)
                    || returns.contains(self)
            }
            Confirmed => matches!(self, End | Deleted) || moves.contains(self) || returns.contains(self),
            NoShow | End | Deleted => false,
            AddService | AddedMark | DeletedMark => false,
        }
    }
}

impl fmt::Display for VisitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a visit's append-only history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEventRecord {
    pub event: VisitEvent,
    pub date_time: DateTime<Utc>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Resolved location of a visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementTarget {
    ServicePoint(String),
    Queue(String),
    ServicePointPool(String),
    UserPool(String),
}

impl PlacementTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            PlacementTarget::ServicePoint(_) => TargetKind::ServicePoint,
            PlacementTarget::Queue(_) => TargetKind::Queue,
            PlacementTarget::ServicePointPool(_) => TargetKind::ServicePointPool,
            PlacementTarget::UserPool(_) => TargetKind::UserPool,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PlacementTarget::ServicePoint(id)
            | PlacementTarget::Queue(id)
            | PlacementTarget::ServicePointPool(id)
            | PlacementTarget::UserPool(id) => id,
        }
    }
}

/// One customer journey through a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub status: VisitState,
    pub ticket: String,
    pub branch_id: String,

    pub current_service: Option<Service>,
    #[serde(default)]
    pub served_services: Vec<Service>,
    #[serde(default)]
    pub unserved_services: Vec<Service>,

    #[serde(default)]
    pub visit_events: Vec<VisitEventRecord>,
    #[serde(default)]
    pub parameter_map: HashMap<String, String>,
    #[serde(default)]
    pub visit_marks: Vec<Mark>,

    pub create_date_time: DateTime<Utc>,
    pub transfer_date_time: Option<DateTime<Utc>>,
    /// Seconds after a transfer before the visit may be called again
    #[serde(default)]
    pub transfer_time_delay: i64,
    pub return_date_time: Option<DateTime<Utc>>,
    /// Seconds after a return before the visit may be called again
    #[serde(default)]
    pub return_time_delay: i64,
    pub call_date_time: Option<DateTime<Utc>>,
    pub start_serving_date_time: Option<DateTime<Utc>>,
    pub served_date_time: Option<DateTime<Utc>>,
    pub end_date_time: Option<DateTime<Utc>>,

    pub queue_id: Option<String>,
    pub service_point_id: Option<String>,
    pub pool_service_point_id: Option<String>,
    pub pool_user_id: Option<String>,

    /// Staff member who last called the visit
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl Visit {
    /// A fresh visit with a `CREATED` history entry and no placement
    pub fn new(branch_id: impl Into<String>, services: Vec<Service>, parameters: HashMap<String, String>) -> Self {
        let now = Utc::now();
        let mut services = services.into_iter();
        let current_service = services.next();

        Self {
            id: Uuid::new_v4().to_string(),
            status: VisitState::Created,
            ticket: String::new(),
            branch_id: branch_id.into(),
            current_service,
            served_services: Vec::new(),
            unserved_services: services.collect(),
            visit_events: vec![VisitEventRecord {
                event: VisitEvent::Created,
                date_time: now,
                parameters: HashMap::new(),
            }],
            parameter_map: parameters,
            visit_marks: Vec::new(),
            create_date_time: now,
            transfer_date_time: None,
            transfer_time_delay: 0,
            return_date_time: None,
            return_time_delay: 0,
            call_date_time: None,
            start_serving_date_time: None,
            served_date_time: None,
            end_date_time: None,
            queue_id: None,
            service_point_id: None,
            pool_service_point_id: None,
            pool_user_id: None,
            user_id: None,
            user_name: None,
        }
    }

    pub fn last_event(&self) -> Option<VisitEvent> {
        self.visit_events.last().map(|record| record.event)
    }

    /// Last event that moved the visit, skipping annotations
    pub fn last_transition(&self) -> Option<VisitEvent> {
        self.visit_events
            .iter()
            .rev()
            .map(|record| record.event)
            .find(|event| !event.is_annotation())
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        self.current_service.iter().any(|s| s.id == service_id)
            || self.served_services.iter().any(|s| s.id == service_id)
            || self.unserved_services.iter().any(|s| s.id == service_id)
    }

    pub fn record_event(&mut self, event: VisitEvent, date_time: DateTime<Utc>, parameters: HashMap<String, String>) {
        self.visit_events.push(VisitEventRecord {
            event,
            date_time,
            parameters,
        });
    }

    /// Resolve the placement pointers: service point slot, then queue, then
    /// service point pool, then user pool
    pub fn target(&self) -> Option<PlacementTarget> {
        if let Some(id) = &self.service_point_id {
            return Some(PlacementTarget::ServicePoint(id.clone()));
        }
        if let Some(id) = &self.queue_id {
            return Some(PlacementTarget::Queue(id.clone()));
        }
        if let Some(id) = &self.pool_service_point_id {
            return Some(PlacementTarget::ServicePointPool(id.clone()));
        }
        self.pool_user_id.clone().map(PlacementTarget::UserPool)
    }

    /// The pointer of one particular kind, if set
    pub fn pointer(&self, kind: TargetKind) -> Option<PlacementTarget> {
        match kind {
            TargetKind::ServicePoint => self.service_point_id.clone().map(PlacementTarget::ServicePoint),
            TargetKind::Queue => self.queue_id.clone().map(PlacementTarget::Queue),
            TargetKind::ServicePointPool => self
                .pool_service_point_id
                .clone()
                .map(PlacementTarget::ServicePointPool),
            TargetKind::UserPool => self.pool_user_id.clone().map(PlacementTarget::UserPool),
        }
    }

    /// Point the visit at exactly one container
    pub fn place_at(&mut self, target: &PlacementTarget) {
        self.clear_placement();
        let id = Some(target.id().to_string());
        match target.kind() {
            TargetKind::ServicePoint => self.service_point_id = id,
            TargetKind::Queue => self.queue_id = id,
            TargetKind::ServicePointPool => self.pool_service_point_id = id,
            TargetKind::UserPool => self.pool_user_id = id,
        }
    }

    pub fn clear_placement(&mut self) {
        self.queue_id = None;
        self.service_point_id = None;
        self.pool_service_point_id = None;
        self.pool_user_id = None;
    }

    /// Timestamp of the head-of-line transfer marker, if set and readable
    pub fn transferred_to_start_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.parameter_map.get(TRANSFERRED_TO_START)?;
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    pub fn is_transferred_to_start(&self) -> bool {
        self.parameter_map.contains_key(TRANSFERRED_TO_START)
    }

    pub fn mark_transferred_to_start(&mut self, at: DateTime<Utc>) {
        self.parameter_map
            .insert(TRANSFERRED_TO_START.to_string(), at.to_rfc2822());
    }

    /// Drop the one-shot priority hints consumed by a call
    pub fn clear_call_hints(&mut self) {
        self.parameter_map.remove(TRANSFERRED_TO_START);
        self.return_date_time = None;
        self.transfer_date_time = None;
    }

    /// Seconds in the current leg: since return, else transfer, else creation
    pub fn waiting_time(&self, now: DateTime<Utc>) -> i64 {
        let since = self
            .return_date_time
            .or(self.transfer_date_time)
            .unwrap_or(self.create_date_time);
        (now - since).num_seconds()
    }

    /// Seconds since creation
    pub fn life_time(&self, now: DateTime<Utc>) -> i64 {
        (now - self.create_date_time).num_seconds()
    }

    pub fn returning_time(&self, now: DateTime<Utc>) -> Option<i64> {
        self.return_date_time.map(|at| (now - at).num_seconds())
    }

    pub fn transferring_time(&self, now: DateTime<Utc>) -> Option<i64> {
        self.transfer_date_time.map(|at| (now - at).num_seconds())
    }

    pub fn serving_time(&self, now: DateTime<Utc>) -> Option<i64> {
        let start = self.start_serving_date_time?;
        let end = self.served_date_time.unwrap_or(now);
        Some((end - start).num_seconds())
    }

    /// Return and transfer cool-downs have both elapsed
    pub fn cooldowns_elapsed(&self, now: DateTime<Utc>) -> bool {
        let returned = self
            .returning_time(now)
            .is_none_or(|secs| secs >= self.return_time_delay);
        let transferred = self
            .transferring_time(now)
            .is_none_or(|secs| secs >= self.transfer_time_delay);
        returned && transferred
    }

    pub fn current_queue_link(&self) -> Option<&str> {
        self.current_service
            .as_ref()
            .and_then(|s| s.linked_queue_id.as_deref())
    }
}
