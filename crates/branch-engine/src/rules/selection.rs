//! Ranking shared by the time-based call rules.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{Branch, ServicePoint, Visit};

/// Seconds a visit scores under a rule; larger is called first
pub(crate) type Metric = fn(&Visit, DateTime<Utc>) -> i64;

/// Waiting in a queue with every cool-down elapsed
pub(crate) fn is_eligible(visit: &Visit, now: DateTime<Utc>) -> bool {
    visit.status.is_waiting() && visit.cooldowns_elapsed(now)
}

/// Strict "called before" order between two eligible visits
///
/// A head-of-line transfer marker beats any metric; between two marked
/// visits the earlier marker wins. Equal visits do not outrank each other,
/// so the first one seen keeps its place.
pub(crate) fn outranks(candidate: &Visit, best: &Visit, now: DateTime<Utc>, metric: Metric) -> bool {
    match (candidate.is_transferred_to_start(), best.is_transferred_to_start()) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => match (candidate.transferred_to_start_at(), best.transferred_to_start_at()) {
            (Some(c), Some(b)) => c < b,
            (Some(_), None) => true,
            _ => false,
        },
        (false, false) => metric(candidate, now) > metric(best, now),
    }
}

/// Pick the best eligible visit across `queue_ids`, in that order
///
/// Unknown queue ids are skipped. The chosen visit's one-shot hints
/// (transfer marker, return and transfer timestamps) are consumed on the
/// stored copy and the returned clone alike.
pub(crate) fn select(branch: &mut Branch, queue_ids: &[String], now: DateTime<Utc>, metric: Metric) -> Option<Visit> {
    let mut best: Option<(&str, usize, &Visit)> = None;

    for queue_id in queue_ids {
        let Some(queue) = branch.queues.get(queue_id) else {
            debug!("Skipping unknown queue {} in branch {}", queue_id, branch.id);
            continue;
        };
        for (index, visit) in queue.visits.iter().enumerate() {
            if !is_eligible(visit, now) {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, _, current)) => outranks(visit, current, now, metric),
            };
            if better {
                best = Some((queue.id.as_str(), index, visit));
            }
        }
    }

    let (queue_id, index) = best.map(|(q, i, _)| (q.to_string(), i))?;
    let stored = branch.queues.get_mut(&queue_id)?.visits.get_mut(index)?;
    stored.clear_call_hints();
    Some(stored.clone())
}

/// Open service points whose user's work profile reaches `queue_id`,
/// ordered by id
pub(crate) fn service_points_reaching(branch: &Branch, queue_id: &str) -> Vec<ServicePoint> {
    let mut points: Vec<ServicePoint> = branch
        .service_points
        .values()
        .filter(|sp| {
            sp.user_id
                .as_ref()
                .and_then(|u| branch.users.get(u))
                .and_then(|u| u.current_work_profile_id.as_ref())
                .and_then(|wp| branch.work_profiles.get(wp))
                .is_some_and(|wp| wp.reaches(queue_id))
        })
        .cloned()
        .collect();
    points.sort_by(|a, b| a.id.cmp(&b.id));
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Queue, Service, VisitState};
    use chrono::Duration;
    use std::collections::HashMap;

    fn waiting(age_secs: i64, now: DateTime<Utc>) -> Visit {
        let mut v = Visit::new("b1", vec![Service::new("s1", "Cash", "q1")], HashMap::new());
        v.status = VisitState::PlacedInQueue;
        v.create_date_time = now - Duration::seconds(age_secs);
        v
    }

    fn waiting_time(v: &Visit, now: DateTime<Utc>) -> i64 {
        v.waiting_time(now)
    }

    #[test]
    fn test_marker_dominates_metric() {
        let now = Utc::now();
        let old = waiting(900, now);
        let mut marked = waiting(10, now);
        marked.mark_transferred_to_start(now);
        assert!(outranks(&marked, &old, now, waiting_time));
        assert!(!outranks(&old, &marked, now, waiting_time));
    }

    #[test]
    fn test_earlier_marker_wins() {
        let now = Utc::now();
        let mut first = waiting(10, now);
        first.mark_transferred_to_start(now - Duration::seconds(300));
        let mut second = waiting(500, now);
        second.mark_transferred_to_start(now - Duration::seconds(60));
        assert!(outranks(&first, &second, now, waiting_time));
    }

    #[test]
    fn test_tie_keeps_first_and_skips_unknown_queue() {
        let now = Utc::now();
        let a = waiting(100, now);
        let mut b = waiting(100, now);
        b.create_date_time = a.create_date_time;
        let first_id = a.id.clone();

        let mut queue = Queue::new("q1", "Cash", "A");
        queue.visits = vec![a, b];
        let mut branch = Branch::new("b1", "Main").with_queue(queue);

        let picked = select(&mut branch, &["nope".to_string(), "q1".to_string()], now, waiting_time).unwrap();
        assert_eq!(picked.id, first_id);
    }

    #[test]
    fn test_not_waiting_is_not_eligible() {
        let now = Utc::now();
        let mut v = waiting(100, now);
        v.status = VisitState::Called;
        assert!(!is_eligible(&v, now));
    }
}
