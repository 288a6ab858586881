use serde::{Deserialize, Serialize};

use super::visit::Visit;

/// Waiting line with its own ticket sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: String,
    pub name: String,
    pub ticket_prefix: String,
    #[serde(default)]
    pub ticket_counter: i64,
    #[serde(default)]
    pub visits: Vec<Visit>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Queue {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ticket_prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ticket_prefix: ticket_prefix.into(),
            ticket_counter: 0,
            visits: Vec::new(),
            branch_id: None,
        }
    }

    /// Human ticket text for a counter value: prefix plus three digits
    pub fn ticket_for(&self, counter: i64) -> String {
        format!("{}{:03}", self.ticket_prefix, counter)
    }

    pub fn contains(&self, visit_id: &str) -> bool {
        self.visits.iter().any(|v| v.id == visit_id)
    }

    pub fn position_of(&self, visit_id: &str) -> Option<usize> {
        self.visits.iter().position(|v| v.id == visit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_is_zero_padded() {
        let queue = Queue::new("q1", "Cash", "A");
        assert_eq!(queue.ticket_for(1), "A001");
        assert_eq!(queue.ticket_for(42), "A042");
        assert_eq!(queue.ticket_for(1234), "A1234");
    }
}
