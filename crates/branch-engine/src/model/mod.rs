//! Branch domain model.
//!
//! [`Branch`] is the aggregate root; everything else is owned by exactly one
//! branch. Visits are stored by value inside the container that currently
//! holds them, so moving a visit is always a detach followed by a place.

pub mod branch;
pub mod branch_config;
pub mod catalog;
pub mod queue;
pub mod service_point;
pub mod user;
pub mod visit;

pub use branch::{Branch, CloseOptions};
pub use catalog::{Mark, ScriptRule, SegmentationRuleData, Service, ServiceGroup, WorkProfile};
pub use queue::Queue;
pub use service_point::ServicePoint;
pub use user::User;
pub use visit::{
    PlacementTarget, TargetKind, Visit, VisitEvent, VisitEventRecord, VisitState, LAST_QUEUE_ID,
    TRANSFERRED_TO_START,
};

/// Where a visit is inserted into an ordered container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Head of the container
    Start,
    /// Tail of the container
    #[default]
    End,
    /// Explicit position; must not exceed the current length
    Index(usize),
}

impl Placement {
    pub fn from_start_flag(insert_at_start: bool) -> Self {
        if insert_at_start {
            Placement::Start
        } else {
            Placement::End
        }
    }

    /// Position `self` resolves to in a container of `len` elements, or
    /// `None` when an explicit index is out of bounds
    pub fn position(&self, len: usize) -> Option<usize> {
        match *self {
            Placement::Start => Some(0),
            Placement::End => Some(len),
            Placement::Index(i) if i <= len => Some(i),
            Placement::Index(_) => None,
        }
    }
}
