//! # Branch Engine for QFlow
//!
//! Core of a walk-in customer queue system: the authoritative in-memory
//! model of branch offices, the visit lifecycle inside them, and the call
//! rules that decide which customer a staff member serves next.
//!
//! ## Features
//!
//! - **Visit lifecycle**: guarded state machine, single placement of every
//!   visit across queues, service point slots and pools
//! - **Call rules**: longest waiting, longest life time, or an external
//!   decision service; return and transfer cool-downs; head-of-line markers
//! - **Segmentation**: property rules and scripted rules routing new visits
//!   to queues
//! - **Configuration publishing**: whole branch sets replaced atomically
//!   with snapshot rollback
//! - **Notifications**: ordered outbox per operation, broadcast bus with
//!   bounded history
//!
//! ## Architecture
//!
//! - [`model`]: branch aggregate, visits, queues, service points, users
//! - [`rules`]: call rules, segmentation and the script evaluator
//! - [`service`]: branch store, visit operations, configuration publisher
//! - [`events`]: notifications, outbox and publishers
//! - [`identity`]: identity provider boundary
//! - [`config`], [`logging`], [`error`]: ambient plumbing
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use qflow_branch_engine::prelude::*;
//!
//! # fn main() -> qflow_branch_engine::Result<()> {
//! let engine = BranchEngine::new(BranchEngineConfig::default())?;
//!
//! let branch = Branch::new("b1", "Main Street")
//!     .with_queue(Queue::new("q1", "Cash desk", "A"))
//!     .with_service(Service::new("s1", "Cash", "q1"))
//!     .with_service_point(ServicePoint::new("sp1", "Window 1"))
//!     .with_work_profile(WorkProfile::new("wp1", "Teller").with_queue("q1"));
//! engine.branches().add(branch)?;
//! engine.branches().open_service_point("b1", "alice", "sp1", "wp1")?;
//!
//! let visit = engine.visits().create_visit("b1", &["s1".to_string()], HashMap::new())?;
//! assert_eq!(visit.ticket, "A001");
//!
//! let called = engine.visits().call_next("b1", "sp1")?;
//! assert_eq!(called.map(|v| v.id), Some(visit.id));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Domain
pub mod model;
pub mod rules;

// Services and boundaries
pub mod events;
pub mod identity;
pub mod service;

// Re-exports for convenience
pub use config::BranchEngineConfig;
pub use error::{BranchError, ErrorKind, Result};

use events::{EventBus, NotificationPublisher};
use identity::{IdentityProvider, NoIdentityProvider};
use logging::log_welcome;
use rules::{CallRules, RuleDecisionService};
use service::{BranchService, ConfigurationPublisher, VisitService};

/// Wires the store, visit operations and configuration publisher together
///
/// By default notifications go to an [`EventBus`] sized from the config and
/// nobody is known to the identity provider.
pub struct BranchEngine {
    config: Arc<BranchEngineConfig>,
    bus: Option<Arc<EventBus>>,
    branches: Arc<BranchService>,
    visits: VisitService,
    publisher: ConfigurationPublisher,
}

impl BranchEngine {
    pub fn new(config: BranchEngineConfig) -> Result<Self> {
        let bus = Arc::new(EventBus::from_config(&config));
        let mut engine = Self::with_collaborators(config, bus.clone(), Arc::new(NoIdentityProvider), None)?;
        engine.bus = Some(bus);
        Ok(engine)
    }

    /// Build with explicit collaborators; `decision` enables the custom call
    /// rule
    pub fn with_collaborators(
        config: BranchEngineConfig,
        publisher: Arc<dyn NotificationPublisher>,
        identity: Arc<dyn IdentityProvider>,
        decision: Option<Arc<dyn RuleDecisionService>>,
    ) -> Result<Self> {
        config.validate().map_err(BranchError::configuration)?;
        let config = Arc::new(config);

        let mut rules = CallRules::new(config.rules.default_call_rule);
        if let Some(decision) = decision {
            rules = rules.with_custom(decision);
        }
        rules.get(config.rules.default_call_rule)?;

        log_welcome(&config.general.application_name, env!("CARGO_PKG_VERSION"));
        let branches = Arc::new(BranchService::new(config.clone(), publisher, identity));
        tracing::info!(
            "🎯 Branch engine '{}' ready, default call rule {}",
            config.general.application_name,
            config.rules.default_call_rule
        );

        Ok(Self {
            visits: VisitService::new(branches.clone(), Arc::new(rules)),
            publisher: ConfigurationPublisher::new(branches.clone()),
            branches,
            bus: None,
            config,
        })
    }

    pub fn config(&self) -> &BranchEngineConfig {
        &self.config
    }

    /// The built-in bus, when the engine created one
    pub fn event_bus(&self) -> Option<&Arc<EventBus>> {
        self.bus.as_ref()
    }

    pub fn branches(&self) -> &Arc<BranchService> {
        &self.branches
    }

    pub fn visits(&self) -> &VisitService {
        &self.visits
    }

    pub fn configuration(&self) -> &ConfigurationPublisher {
        &self.publisher
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{BranchEngine, BranchEngineConfig, BranchError, ErrorKind, Result};

    pub use crate::config::{EventsConfig, GeneralConfig, RulesConfig, ServicePointConfig};
    pub use crate::logging::{setup_logging, LoggingConfig};

    pub use crate::model::{
        Branch, CloseOptions, Mark, Placement, PlacementTarget, Queue, ScriptRule, SegmentationRuleData,
        Service, ServiceGroup, ServicePoint, User, Visit, VisitEvent, VisitState, WorkProfile,
    };

    pub use crate::rules::{
        CallRule, CallRuleKind, CallRules, CustomCallRule, ExpressionEvaluator, MaxLifeTimeCallRule,
        MaxWaitingTimeCallRule, RuleDecisionService, ScriptEvaluator, SegmentationRule,
    };

    pub use crate::events::{EventBus, Notification, NotificationPublisher, NullPublisher, Outbox};
    pub use crate::identity::{IdentityProvider, NoIdentityProvider, UserGroup, UserInfo};
    pub use crate::service::{BranchService, BranchSummary, ConfigurationPublisher, VisitService};
}
