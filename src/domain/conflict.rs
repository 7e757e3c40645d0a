use crate::domain::models::{CalendarEvent, CalendarKind};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Candidate interval for a new or edited meeting/appointment.
#[derive(Debug, Clone)]
pub struct CandidateSlot {
    pub start_time: i64,
    pub end_time: i64,
    pub all_day: bool,
    /// Id of the entity being edited, so it does not conflict with itself.
    pub exclude_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Conflict {
    pub overlapping: CalendarEvent,
    pub kind: CalendarKind,
}

/// First-match scan across the combined calendar: meetings before
/// appointments, each in collection order. Pure over already-fetched
/// collections; entries that cannot be compared are skipped, never errors.
pub fn detect_conflict(
    candidate: &CandidateSlot,
    meetings: &[CalendarEvent],
    appointments: &[CalendarEvent],
    tz: Tz,
) -> Option<Conflict> {
    let scan = |events: &[CalendarEvent], kind: CalendarKind| -> Option<Conflict> {
        events
            .iter()
            .filter(|event| candidate.exclude_id.as_deref() != Some(event.id.as_str()))
            .find(|event| slots_overlap(candidate, event, tz))
            .map(|event| Conflict {
                overlapping: event.clone(),
                kind,
            })
    };

    scan(meetings, CalendarKind::Meeting)
        .or_else(|| scan(appointments, CalendarKind::Appointment))
}

fn slots_overlap(candidate: &CandidateSlot, existing: &CalendarEvent, tz: Tz) -> bool {
    if !existing.all_day && existing.end_time <= existing.start_time {
        // Not a comparable interval; filtered out of consideration.
        return false;
    }

    if candidate.all_day || existing.all_day {
        let Some((candidate_start, candidate_end)) =
            day_span(candidate.start_time, candidate.end_time, tz)
        else {
            return false;
        };
        let Some((existing_start, existing_end)) =
            day_span(existing.start_time, existing.end_time, tz)
        else {
            return false;
        };
        // Day-normalized bounds compare inclusively: sharing a calendar day
        // is a conflict.
        return candidate_start <= existing_end && candidate_end >= existing_start;
    }

    // Half-open intervals: touching endpoints do not conflict.
    candidate.start_time < existing.end_time && candidate.end_time > existing.start_time
}

/// Expands an interval to full local calendar days: 00:00:00 on the start's
/// day through 23:59:59 on the end's day.
fn day_span(start_time: i64, end_time: i64, tz: Tz) -> Option<(i64, i64)> {
    let start = start_of_day(start_time, tz)?;
    let end = end_of_day(end_time.max(start_time), tz)?;
    Some((start, end))
}

fn start_of_day(timestamp: i64, tz: Tz) -> Option<i64> {
    let local = DateTime::<Utc>::from_timestamp(timestamp, 0)?.with_timezone(&tz);
    let midnight = local.date_naive().and_hms_opt(0, 0, 0)?;
    Some(tz.from_local_datetime(&midnight).earliest()?.timestamp())
}

fn end_of_day(timestamp: i64, tz: Tz) -> Option<i64> {
    let local = DateTime::<Utc>::from_timestamp(timestamp, 0)?.with_timezone(&tz);
    let last_second = local.date_naive().and_hms_opt(23, 59, 59)?;
    Some(tz.from_local_datetime(&last_second).latest()?.timestamp())
}
