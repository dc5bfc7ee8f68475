use crate::domain::models::Appointment;
use crate::domain::time::{day_span, format_wire, DisplayZone};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    NoConflict,
    Conflict {
        reason: String,
        conflicting_id: Option<i64>,
    },
}

impl ConflictOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Half-open interval test: touching bounds never overlap.
pub fn intervals_overlap(
    start_a: DateTime<Utc>,
    end_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    end_b: DateTime<Utc>,
) -> bool {
    start_a < end_b && start_b < end_a
}

pub fn appointments_overlap(a: &Appointment, b: &Appointment, zone: &DisplayZone) -> bool {
    if a.is_all_day || b.is_all_day {
        let spans = day_span(a.start_at, a.end_at, zone)
            .and_then(|span_a| day_span(b.start_at, b.end_at, zone).map(|span_b| (span_a, span_b)));
        if let Ok(((first_a, last_a), (first_b, last_b))) = spans {
            return first_a <= last_b && first_b <= last_a;
        }
    }
    intervals_overlap(a.start_at, a.end_at, b.start_at, b.end_at)
}

/// Checks `candidate` against every appointment except `exclude_id` and
/// reports the first overlap found in iteration order.
pub fn detect_conflict<'a, I>(
    candidate: &Appointment,
    existing: I,
    exclude_id: Option<i64>,
    zone: &DisplayZone,
) -> ConflictOutcome
where
    I: IntoIterator<Item = &'a Appointment>,
{
    existing
        .into_iter()
        .filter(|other| Some(other.id) != exclude_id)
        .find(|other| appointments_overlap(candidate, other, zone))
        .map(|other| ConflictOutcome::Conflict {
            reason: conflict_reason(other, zone),
            conflicting_id: other.is_persisted().then_some(other.id),
        })
        .unwrap_or(ConflictOutcome::NoConflict)
}

fn conflict_reason(other: &Appointment, zone: &DisplayZone) -> String {
    if other.is_all_day {
        let date = zone
            .local_date(other.start_at)
            .unwrap_or_else(|_| other.start_at.date_naive());
        return format!(
            "Appointment conflicts with all-day \"{}\" on {date}",
            other.title
        );
    }
    format!(
        "Appointment conflicts with \"{}\" ({} to {})",
        other.title,
        format_wire(other.start_at),
        format_wire(other.end_at)
    )
}
