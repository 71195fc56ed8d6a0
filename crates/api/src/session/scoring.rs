//! Pure scoring arithmetic. All awarded values are integers rounded down.

use super::state::Participant;
use chrono::{DateTime, Utc};
use core::cmp::Ordering;

/// Whole seconds between the question being posted and the answer arriving, never negative.
pub fn time_spent(started: DateTime<Utc>, answered: DateTime<Utc>) -> u32 {
    let seconds = (answered - started).num_seconds().max(0);
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

/// `floor(points * multiplier * (1 - spent / limit))`, clamped to zero at or after the limit.
pub fn speed_bonus(points: u32, multiplier: f64, spent: u32, limit: u32) -> u32 {
    if limit == 0 || spent >= limit {
        return 0;
    }
    let remaining = 1.0 - f64::from(spent) / f64::from(limit);
    let bonus = (f64::from(points) * multiplier * remaining).floor();
    if bonus.is_finite() && bonus > 0.0 {
        bonus as u32
    } else {
        0
    }
}

/// Highest score first. Equal scores are ordered by mean answering time, and participants who
/// never answered trail everyone with at least one answer. Remaining ties keep join order.
pub fn compare(a: &Participant, b: &Participant) -> Ordering {
    b.score.cmp(&a.score).then_with(|| match (a.average_time(), b.average_time()) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

pub fn standings<'p>(participants: impl IntoIterator<Item = &'p Participant>) -> Vec<&'p Participant> {
    let mut ranked: Vec<_> = participants.into_iter().collect();
    ranked.sort_by(|a, b| compare(a, b));
    ranked
}
