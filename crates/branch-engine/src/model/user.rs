use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::visit::Visit;

/// Staff member working in a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Login name, as known to the identity provider
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub current_work_profile_id: Option<String>,
    #[serde(default)]
    pub service_point_id: Option<String>,
    /// Visits assigned to this person regardless of where they sit
    #[serde(default)]
    pub pool: Vec<Visit>,
    #[serde(default)]
    pub last_break_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_break_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_break_reason: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            first_name: None,
            last_name: None,
            email: None,
            current_work_profile_id: None,
            service_point_id: None,
            pool: Vec::new(),
            last_break_start_time: None,
            last_break_end_time: None,
            last_break_reason: None,
            branch_id: None,
        }
    }

    pub fn with_work_profile(mut self, work_profile_id: impl Into<String>) -> Self {
        self.current_work_profile_id = Some(work_profile_id.into());
        self
    }

    pub fn on_break(&self) -> bool {
        match (self.last_break_start_time, self.last_break_end_time) {
            (Some(start), Some(end)) => start > end,
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn start_break(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.last_break_start_time = Some(at);
        self.last_break_end_time = None;
        self.last_break_reason = Some(reason.into());
    }

    /// Close an open break; returns false when the user was not on one
    pub fn end_break(&mut self, at: DateTime<Utc>) -> bool {
        if !self.on_break() {
            return false;
        }
        self.last_break_end_time = Some(at);
        true
    }
}
