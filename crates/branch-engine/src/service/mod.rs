//! Service layer: the branch store, staff visit operations and
//! configuration publishing.
//!
//! Aggregate methods on [`Branch`](crate::model::Branch) only describe what
//! happened in an [`Outbox`](crate::events::Outbox). The services here own
//! the locking and dispatch every outbox once the branch lock is released.

pub mod branch_service;
pub mod configuration;
pub mod visit_service;

pub use branch_service::{BranchService, BranchSummary};
pub use configuration::ConfigurationPublisher;
pub use visit_service::VisitService;
