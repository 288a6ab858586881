use serde::{Deserialize, Serialize};

use super::visit::Visit;

/// Window at which one bound staff member serves visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePoint {
    pub id: String,
    pub name: String,
    /// Id of the user working here; the user record lives in the branch
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub current_visit: Option<Visit>,
    /// Visits earmarked for this point but not yet being served
    #[serde(default)]
    pub pool: Vec<Visit>,
    /// Called visits wait for an explicit confirm instead of being
    /// confirmed on call
    #[serde(default)]
    pub confirm_required: bool,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl ServicePoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            user_id: None,
            current_visit: None,
            pool: Vec::new(),
            confirm_required: false,
            branch_id: None,
        }
    }

    pub fn with_confirm_required(mut self) -> Self {
        self.confirm_required = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.user_id.is_some()
    }

    /// The current slot holds a visit other than `visit_id`
    pub fn is_busy_with_other(&self, visit_id: &str) -> bool {
        self.current_visit
            .as_ref()
            .is_some_and(|current| current.id != visit_id)
    }
}
